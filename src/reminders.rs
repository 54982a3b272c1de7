//! Daily reminder for loans that are due back
use super::error::WorkflowError;
use super::notify::{Links, Notification, NotificationDispatcher};
use super::slip::{Slip, SlipKind, SlipState};
use super::store::SlipStore;
use chrono::NaiveDate;

/// Loans still out whose expected return date on any item is `today`.
pub fn due_loans(slips: &[Slip], today: NaiveDate) -> Vec<&Slip> {
    slips
        .iter()
        .filter(|s| s.kind() == SlipKind::Loan && s.state() == SlipState::Borrowing)
        .filter(|s| {
            s.items().iter().any(|item| {
                item.loan
                    .as_ref()
                    .and_then(|terms| terms.expected_return)
                    .is_some_and(|day| day.to_naive() == today)
            })
        })
        .collect()
}

/// Sends one reminder per due loan to its requester and returns how many
/// were handed to the dispatcher. Loans without a requester email are
/// skipped, a failed delivery is logged and does not stop the run.
pub fn send_due_reminders<S, N>(
    store: &S,
    dispatcher: &N,
    links: &Links,
    today: NaiveDate,
) -> Result<usize, WorkflowError>
where
    S: SlipStore,
    N: NotificationDispatcher,
{
    let loans = store.list(SlipKind::Loan)?;
    let mut sent = 0;

    for slip in due_loans(&loans, today) {
        let email = slip.requester().email.trim();
        if email.is_empty() {
            tracing::warn!(slip_id = slip.id(), "due loan has no requester email");
            continue;
        }

        let message = format!(
            "The items borrowed on slip {} are due back today ({}). Please return them to the warehouse.",
            slip.reference(),
            today.format("%d/%m/%Y")
        );
        let notification = Notification {
            subject: format!("[{}] Slip {} due back today", SlipKind::Loan.subject_tag(), slip.reference()),
            body: links.with_link(&message, slip),
            recipients: vec![email.to_string()],
            slip: slip.clone(),
        };

        match dispatcher.notify(&notification) {
            Ok(()) => sent += 1,
            Err(error) => tracing::warn!(slip_id = slip.id(), %error, "reminder not delivered"),
        }
    }

    tracing::info!(%today, sent, "due loan reminders sent");
    Ok(sent)
}
