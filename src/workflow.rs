//! Service layer: the approval engine shared by every slip type.
//!
//! [`Workflow`] is instantiated once per topology. Each transition is a
//! read, a guard check, and a single compare-and-save of the whole slip
//! (state, stamps and history together). Notifications go out only after
//! that write has landed, and their failure never undoes it.
use super::audit::HistoryEntry;
use super::error::{StoreError, WorkflowError};
use super::notify::{Links, Notification, NotificationDispatcher};
use super::query::SlipFilter;
use super::reminders;
use super::roles::{ActorId, RoleAuthority};
use super::slip::{
    Action, Attachment, AttachmentPurpose, LineItem, Requester, Slip, SlipKind, SlipState, Stamp, TimeStamp,
};
use super::store::SlipStore;
use super::topology::{Export, Guard, Loan, NoteSource, Purchase, Recipients, Topology, Transition};
use chrono::NaiveDate;
use std::marker::PhantomData;

// edits re-read and retry when they lose a race with another edit
const EDIT_ATTEMPTS: usize = 3;

pub type LoanWorkflow<S, R, N> = Workflow<Loan, S, R, N>;
pub type PurchaseWorkflow<S, R, N> = Workflow<Purchase, S, R, N>;
pub type ExportWorkflow<S, R, N> = Workflow<Export, S, R, N>;

pub struct Workflow<T, S, R, N> {
    store: S,
    authority: R,
    dispatcher: N,
    links: Links,
    topology: PhantomData<fn() -> T>,
}

/// Contents of a slip at creation.
#[derive(Debug, Clone, Default)]
pub struct NewSlip {
    pub requester: Requester,
    pub reason: String,
    pub note: Option<String>,
    pub items: Vec<LineItem>,
    pub attachments: Vec<Attachment>,
}

/// Changes allowed while a slip is in draft or rejected state.
#[derive(Debug, Clone, Default)]
pub struct SlipUpdate {
    pub reason: Option<String>,
    pub note: Option<String>,
    pub add_items: Vec<LineItem>,
    pub remove_items: Vec<u32>,
    pub add_attachments: Vec<Attachment>,
    pub remove_attachments: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub slip: Slip,
    pub from: SlipState,
    pub state: SlipState,
    pub entry: HistoryEntry,
    pub recipients: Vec<String>,
}

impl<T, S, R, N> Workflow<T, S, R, N>
where
    T: Topology,
    S: SlipStore,
    R: RoleAuthority,
    N: NotificationDispatcher,
{
    pub fn new(store: S, authority: R, dispatcher: N) -> Self {
        Self {
            store,
            authority,
            dispatcher,
            links: Links::default(),
            topology: PhantomData,
        }
    }

    pub fn with_links(mut self, links: Links) -> Self {
        self.links = links;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
    pub fn authority(&self) -> &R {
        &self.authority
    }
    pub fn dispatcher(&self) -> &N {
        &self.dispatcher
    }
    pub fn links(&self) -> &Links {
        &self.links
    }

    /// Creates a draft owned by `owner`.
    pub fn create(&self, owner: &ActorId, new: NewSlip) -> Result<Slip, WorkflowError> {
        let id = self.store.next_id(T::KIND)?;
        let mut slip = Slip::new(
            id,
            T::KIND,
            owner.clone(),
            new.requester,
            new.reason,
            new.note,
        );
        for item in new.items {
            slip.push_item(item)?;
        }
        for attachment in new.attachments {
            slip.push_attachment(attachment);
        }

        let note = format!("Reason: {}", slip.reason());
        let created_at = slip.created_at();
        slip.history_mut()
            .append(id, owner, "Created", Some(&note), created_at)?;

        self.store.insert(&slip)?;
        tracing::info!(kind = %T::KIND, slip_id = id, owner = %owner, "slip created");
        Ok(slip)
    }

    pub fn get(&self, id: u64) -> Result<Slip, WorkflowError> {
        Ok(self.store.get(T::KIND, id)?)
    }

    pub fn history(&self, id: u64) -> Result<Vec<HistoryEntry>, WorkflowError> {
        Ok(self.get(id)?.history().iter().cloned().collect())
    }

    pub fn list(&self, filter: &SlipFilter) -> Result<Vec<Slip>, WorkflowError> {
        Ok(filter.apply(self.store.list(T::KIND)?))
    }

    /// Edits header, items and attachments. Only the owner or an
    /// administrator may edit, and only in draft or rejected state. A
    /// rejected slip goes back to draft.
    pub fn edit(&self, id: u64, actor: &ActorId, update: SlipUpdate) -> Result<Slip, WorkflowError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let slip = self.get(id)?;
            if !slip.state().is_editable() {
                return Err(WorkflowError::NotEditable {
                    state: slip.state(),
                });
            }
            if slip.owner() != actor && !self.authority.actor_is_administrator(actor) {
                return Err(WorkflowError::PermissionDenied {
                    actor: actor.to_string(),
                    operation: format!("edit {} slip {}", T::KIND, slip.reference()),
                });
            }

            let mut next = slip.clone();
            Self::apply_update(&mut next, &update)?;
            if next.state() == SlipState::Rejected {
                next.set_state(SlipState::Draft);
            }
            next.history_mut()
                .append(id, actor, "Updated", Some("Details edited"), TimeStamp::now())?;
            next.bump_version();

            match self.store.compare_and_save(&next, slip.state(), slip.version()) {
                Ok(()) => {
                    tracing::info!(kind = %T::KIND, slip_id = id, actor = %actor, "slip edited");
                    return Ok(next);
                }
                Err(StoreError::Conflict { .. }) if attempt < EDIT_ATTEMPTS => {
                    tracing::debug!(kind = %T::KIND, slip_id = id, attempt, "edit raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fires `action` on slip `id` on behalf of `actor`.
    ///
    /// `note` is recorded for rejections and returns; other transitions note
    /// the label of the state they land in.
    pub fn apply_transition(
        &self,
        id: u64,
        action: T::Action,
        actor: &ActorId,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.apply(id, action.into(), actor, note, |_, _| {})
    }

    /// Same as [`Workflow::apply_transition`] with the action given by name,
    /// as it arrives from a route or form.
    pub fn apply_named(
        &self,
        id: u64,
        action: &str,
        actor: &ActorId,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let action: T::Action = action.trim().parse()?;
        self.apply_transition(id, action, actor, note)
    }

    fn apply(
        &self,
        id: u64,
        action: Action,
        actor: &ActorId,
        note: Option<&str>,
        extra: impl FnOnce(&mut Slip, TimeStamp),
    ) -> Result<TransitionOutcome, WorkflowError> {
        let slip = self.get(id)?;
        let from = slip.state();

        let Some(row) = T::find(from, action) else {
            tracing::debug!(kind = %T::KIND, slip_id = id, %action, state = %from, "no such transition");
            return Err(WorkflowError::InvalidStateTransition {
                kind: T::KIND,
                action,
                state: from,
            });
        };
        if !self.permits(row.guard, &slip, actor) {
            tracing::debug!(kind = %T::KIND, slip_id = id, %action, actor = %actor, "guard refused");
            return Err(WorkflowError::PermissionDenied {
                actor: actor.to_string(),
                operation: format!("{action} {} slip {}", T::KIND, slip.reference()),
            });
        }

        let now = TimeStamp::now();
        let mut next = slip.clone();
        next.set_state(row.to);
        for step in row.stamps {
            next.record(
                *step,
                Stamp {
                    actor: actor.clone(),
                    at: now,
                },
            );
        }
        extra(&mut next, now);

        let note = match row.note {
            NoteSource::TargetLabel => Some(row.to.label()),
            NoteSource::Caller => note.map(str::trim).filter(|n| !n.is_empty()),
        };
        let entry = next.history_mut().append(id, actor, row.label, note, now)?.clone();
        next.bump_version();

        match self.store.compare_and_save(&next, from, slip.version()) {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                tracing::info!(kind = %T::KIND, slip_id = id, %action, "lost transition race");
                return Err(WorkflowError::InvalidStateTransition {
                    kind: T::KIND,
                    action,
                    state: from,
                });
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            kind = %T::KIND,
            slip_id = id,
            %action,
            actor = %actor,
            from = %from,
            to = %row.to,
            "transition applied"
        );

        let recipients = self.recipients(row.notify, &next);
        self.dispatch(row, &next, note, &recipients);

        Ok(TransitionOutcome {
            from,
            state: next.state(),
            entry,
            recipients,
            slip: next,
        })
    }

    fn permits(&self, guard: Guard, slip: &Slip, actor: &ActorId) -> bool {
        let owner = slip.owner() == actor;
        match guard {
            Guard::Role(role) => self.authority.satisfies(actor, role),
            Guard::Owner => owner || self.authority.actor_is_administrator(actor),
            Guard::OwnerOr(role) => owner || self.authority.satisfies(actor, role),
            Guard::AnyOf(roles) => roles.iter().any(|role| self.authority.satisfies(actor, *role)),
            Guard::AdminOnly => self.authority.actor_is_administrator(actor),
        }
    }

    /// Who hears back about the slip. Loans write to the borrower named on
    /// the slip; other slips go to whoever filed them, falling back to the
    /// header address when that account has none.
    fn submitter_email(&self, slip: &Slip) -> Option<String> {
        let header = Some(slip.requester().email.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        match slip.kind() {
            SlipKind::Loan => header,
            _ => self.authority.email_of(slip.owner()).or(header),
        }
    }

    fn recipients(&self, notify: Recipients, slip: &Slip) -> Vec<String> {
        match notify {
            Recipients::Role(role) => self.authority.emails_with_role(role),
            Recipients::Submitter => self.submitter_email(slip).into_iter().collect(),
        }
    }

    // best effort, the transition is already committed
    fn dispatch(&self, row: &Transition, slip: &Slip, note: Option<&str>, recipients: &[String]) {
        if recipients.is_empty() {
            tracing::warn!(kind = %T::KIND, slip_id = slip.id(), action = %row.action, "nobody to notify");
            return;
        }

        let mut message = row.message.to_string();
        if row.note == NoteSource::Caller {
            message.push_str(&format!("\nNote: {}", note.unwrap_or("none given")));
        }
        let notification = Notification {
            subject: format!("[{}] Slip {} {}", T::KIND.subject_tag(), slip.reference(), row.subject),
            body: self.links.with_link(&message, slip),
            recipients: recipients.to_vec(),
            slip: slip.clone(),
        };

        if let Err(error) = self.dispatcher.notify(&notification) {
            tracing::warn!(kind = %T::KIND, slip_id = slip.id(), %error, "notification not delivered");
        }
    }

    fn apply_update(slip: &mut Slip, update: &SlipUpdate) -> Result<(), WorkflowError> {
        if let Some(reason) = &update.reason {
            slip.reason = reason.clone();
        }
        if let Some(note) = &update.note {
            slip.note = Some(note.clone());
        }
        for id in &update.remove_items {
            if !slip.remove_item(*id) {
                return Err(WorkflowError::InvalidItem(format!("no item #{id} on this slip")));
            }
        }
        for item in &update.add_items {
            slip.push_item(item.clone())?;
        }
        for id in &update.remove_attachments {
            if !slip.remove_attachment(*id) {
                return Err(WorkflowError::InvalidItem(format!("no attachment #{id} on this slip")));
            }
        }
        for attachment in &update.add_attachments {
            slip.push_attachment(attachment.clone());
        }
        Ok(())
    }
}

impl<S, R, N> Workflow<Loan, S, R, N>
where
    S: SlipStore,
    R: RoleAuthority,
    N: NotificationDispatcher,
{
    /// The borrower hands the items back: `user_return` together with the
    /// return photos and the return note, committed as one write.
    pub fn return_loan(
        &self,
        id: u64,
        actor: &ActorId,
        note: Option<&str>,
        images: Vec<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        self.apply(id, Action::UserReturn, actor, note, |slip, now| {
            for file in &images {
                slip.push_attachment(Attachment::new(file, AttachmentPurpose::Return));
            }
            if let Some(note) = note {
                let line = format!("[{}] Return: {note}", now.to_datetime_utc().format("%d/%m"));
                slip.note = Some(match slip.note.take() {
                    Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
                    _ => line,
                });
            }
        })
    }

    /// Reminds borrowers whose items are due back on `today`.
    pub fn send_due_reminders(&self, today: NaiveDate) -> Result<usize, WorkflowError> {
        reminders::send_due_reminders(&self.store, &self.dispatcher, &self.links, today)
    }
}
