//! End to end runs of each approval chain against a real sled store.
mod common;

use anyhow::Context;
use common::{Office, new_slip};
use slip_approval::{
    error::{NotificationError, WorkflowError},
    notify::{Notification, NotificationDispatcher},
    slip::{AttachmentPurpose, Day, LineItem, LoanTerms, SlipState, Step},
    store::SledStore,
    topology::{Export, ExportAction, Loan, LoanAction, Purchase, PurchaseAction},
    workflow::{SlipUpdate, Workflow},
};
use std::sync::{Arc, Barrier};
use tempfile::tempdir;

#[test]
fn loan_rejection_restarts_the_chain() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, loans) = office.workflow::<Loan>()?;

    let slip = loans.create(&office.owner, new_slip("field test")?)?;
    assert_eq!(slip.state(), SlipState::Draft);
    assert_eq!(slip.history().len(), 1);

    let sent = loans
        .apply_transition(slip.id(), LoanAction::Send, &office.owner, None)
        .context("send failed: ")?;
    assert_eq!(sent.state, SlipState::DeptPending);
    assert_eq!(sent.recipients, vec!["head@example.com"]);
    assert_eq!(sent.slip.history().len(), 2);

    // wrong role leaves everything as it was
    let denied = loans.apply_transition(slip.id(), LoanAction::DeptApprove, &office.director, None);
    assert!(matches!(denied, Err(WorkflowError::PermissionDenied { .. })));
    let stored = loans.get(slip.id())?;
    assert_eq!(stored.state(), SlipState::DeptPending);
    assert_eq!(stored.history().len(), 2);

    let approved = loans.apply_transition(slip.id(), LoanAction::DeptApprove, &office.head, None)?;
    assert_eq!(approved.state, SlipState::DirectorPending);
    assert_eq!(approved.slip.stamp(Step::DeptHead).map(|s| &s.actor), Some(&office.head));
    assert_eq!(approved.slip.history().len(), 3);
    assert_eq!(approved.recipients, vec!["director@example.com"]);

    let rejected = loans.apply_transition(
        slip.id(),
        LoanAction::Reject,
        &office.director,
        Some("  budget exhausted "),
    )?;
    assert_eq!(rejected.state, SlipState::Rejected);
    assert!(rejected.slip.rejected_at().is_some());
    assert_eq!(rejected.slip.history().len(), 4);
    assert_eq!(rejected.entry.note.as_deref(), Some("budget exhausted"));
    assert_eq!(rejected.recipients, vec!["an@example.com"]);

    let resent = loans.apply_transition(slip.id(), LoanAction::Send, &office.owner, None)?;
    assert_eq!(resent.state, SlipState::DeptPending);
    assert_eq!(resent.slip.history().len(), 5);
    // earlier stamps stay until their step is reached again
    assert!(resent.slip.stamp(Step::DeptHead).is_some());
    assert!(resent.slip.history().verify(slip.id()));

    Ok(())
}

#[test]
fn purchase_final_approval_notifies_submitter() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, purchases) = office.workflow::<Purchase>()?;

    let id = purchases.create(&office.owner, new_slip("lab supplies")?)?.id();
    purchases.apply_transition(id, PurchaseAction::Send, &office.owner, None)?;
    purchases.apply_transition(id, PurchaseAction::DeptApprove, &office.head, None)?;
    let done = purchases.apply_transition(id, PurchaseAction::DirectorApprove, &office.director, None)?;

    assert_eq!(done.state, SlipState::Approved);
    assert_eq!(done.recipients, vec!["an@example.com"]);
    assert_eq!(done.entry.note.as_deref(), Some(SlipState::Approved.label()));

    let last = office.outbox.last().context("no notification sent")?;
    assert_eq!(last.recipients, vec!["an@example.com"]);
    assert!(last.subject.starts_with("[PURCHASE] Slip #"));
    assert!(last.body.contains(&format!("/purchase/{id}/")));

    // terminal states accept nothing
    let again = purchases.apply_transition(id, PurchaseAction::DirectorApprove, &office.director, None);
    assert!(matches!(again, Err(WorkflowError::InvalidStateTransition { .. })));
    Ok(())
}

#[test]
fn export_passes_the_warehouse_before_the_director() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, exports) = office.workflow::<Export>()?;

    let id = exports.create(&office.owner, new_slip("customer shipment")?)?.id();
    exports.apply_transition(id, ExportAction::Send, &office.owner, None)?;

    let checked = exports.apply_transition(id, ExportAction::DeptApprove, &office.head, None)?;
    assert_eq!(checked.state, SlipState::WarehousePending);
    assert_eq!(checked.recipients, vec!["warehouse@example.com"]);

    // the director has to wait for the warehouse
    assert!(matches!(
        exports.apply_transition(id, ExportAction::DirectorApprove, &office.director, None),
        Err(WorkflowError::InvalidStateTransition { .. })
    ));

    let stocked = exports.apply_transition(id, ExportAction::WarehouseApprove, &office.keeper, None)?;
    assert_eq!(stocked.state, SlipState::DirectorPending);
    assert!(stocked.slip.stamp(Step::WarehouseCheck).is_some());

    let done = exports.apply_transition(id, ExportAction::DirectorApprove, &office.director, None)?;
    assert_eq!(done.state, SlipState::Completed);
    assert_eq!(done.slip.history().len(), 5);
    Ok(())
}

#[test]
fn export_can_be_rejected_at_the_warehouse() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, exports) = office.workflow::<Export>()?;

    let id = exports.create(&office.owner, new_slip("out of stock")?)?.id();
    exports.apply_transition(id, ExportAction::Send, &office.owner, None)?;
    exports.apply_transition(id, ExportAction::DeptApprove, &office.head, None)?;

    let rejected = exports.apply_transition(id, ExportAction::Reject, &office.keeper, Some("no stock"))?;
    assert_eq!(rejected.from, SlipState::WarehousePending);
    assert_eq!(rejected.state, SlipState::Rejected);
    assert!(office.outbox.last().context("no notification")?.body.contains("no stock"));
    Ok(())
}

#[test]
fn full_loan_cycle_with_return() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, loans) = office.workflow::<Loan>()?;

    let mut request = new_slip("site survey")?;
    request.note = Some("handle with care".into());
    let id = loans.create(&office.owner, request)?.id();
    loans.apply_transition(id, LoanAction::Send, &office.owner, None)?;
    loans.apply_transition(id, LoanAction::DeptApprove, &office.head, None)?;
    loans.apply_transition(id, LoanAction::DirectorApprove, &office.director, None)?;

    let out = loans.apply_transition(id, LoanAction::WarehouseExport, &office.keeper, None)?;
    assert_eq!(out.state, SlipState::Borrowing);
    assert_eq!(out.recipients, vec!["an@example.com"]);

    // only the borrower or the warehouse may report a return
    assert!(matches!(
        loans.return_loan(id, &office.stranger, None, vec![]),
        Err(WorkflowError::PermissionDenied { .. })
    ));

    let returned = loans.return_loan(
        id,
        &office.owner,
        Some("all parts present"),
        vec!["return/front.jpg".into(), "return/back.jpg".into()],
    )?;
    assert_eq!(returned.state, SlipState::Returning);
    assert_eq!(returned.recipients, vec!["warehouse@example.com"]);
    assert!(returned.slip.actual_return_at().is_some());
    assert_eq!(returned.slip.stamp(Step::Returner).map(|s| &s.actor), Some(&office.owner));
    assert_eq!(returned.entry.note.as_deref(), Some("all parts present"));

    let photos: Vec<_> = returned
        .slip
        .attachments()
        .iter()
        .filter(|a| a.purpose == AttachmentPurpose::Return)
        .collect();
    assert_eq!(photos.len(), 2);

    let note = returned.slip.note().context("note missing")?;
    let returned_on = returned.slip.actual_return_at().context("no return stamp")?;
    assert!(note.starts_with("handle with care\n["));
    assert!(note.ends_with(&format!(
        "[{}] Return: all parts present",
        returned_on.to_datetime_utc().format("%d/%m")
    )));

    let closed = loans.apply_transition(id, LoanAction::WarehouseConfirm, &office.keeper, None)?;
    assert_eq!(closed.state, SlipState::Returned);
    assert!(closed.slip.stamp(Step::WarehouseIn).is_some());
    assert_eq!(closed.slip.history().len(), 7);
    Ok(())
}

#[test]
fn administrator_passes_every_guard() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, loans) = office.workflow::<Loan>()?;

    let id = loans.create(&office.owner, new_slip("admin run")?)?.id();
    // only an administrator may reject a draft
    assert!(matches!(
        loans.apply_transition(id, LoanAction::Reject, &office.owner, None),
        Err(WorkflowError::PermissionDenied { .. })
    ));
    loans.apply_transition(id, LoanAction::Send, &office.admin, None)?;
    loans.apply_transition(id, LoanAction::DeptApprove, &office.admin, None)?;
    loans.apply_transition(id, LoanAction::DirectorApprove, &office.admin, None)?;
    loans.apply_transition(id, LoanAction::WarehouseExport, &office.admin, None)?;
    loans.apply_transition(id, LoanAction::UserReturn, &office.admin, None)?;
    let done = loans.apply_transition(id, LoanAction::WarehouseConfirm, &office.admin, None)?;
    assert_eq!(done.state, SlipState::Returned);

    let id = loans.create(&office.owner, new_slip("scrapped")?)?.id();
    let rejected = loans.apply_transition(id, LoanAction::Reject, &office.admin, Some("duplicate"))?;
    assert_eq!(rejected.state, SlipState::Rejected);
    Ok(())
}

#[test]
fn racing_approvals_commit_once() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, purchases) = office.workflow::<Purchase>()?;

    let id = purchases.create(&office.owner, new_slip("race")?)?.id();
    purchases.apply_transition(id, PurchaseAction::Send, &office.owner, None)?;

    let barrier = Barrier::new(2);
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = [&office.head, &office.admin]
            .into_iter()
            .map(|actor| {
                let purchases = &purchases;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    purchases.apply_transition(id, PurchaseAction::DeptApprove, actor, None)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let won = results.iter().filter(|r| r.is_ok()).count();
    let lost = results
        .iter()
        .filter(|r| matches!(r, Err(WorkflowError::InvalidStateTransition { .. })))
        .count();
    assert_eq!((won, lost), (1, 1));

    let stored = purchases.get(id)?;
    assert_eq!(stored.state(), SlipState::DirectorPending);
    assert_eq!(stored.history().len(), 3);
    Ok(())
}

#[test]
fn edits_only_while_draft_or_rejected() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, purchases) = office.workflow::<Purchase>()?;
    let id = purchases.create(&office.owner, new_slip("tools")?)?.id();

    let update = SlipUpdate {
        reason: Some("tools and spares".into()),
        add_items: vec![LineItem::new("Screwdriver set", "box", 2)?],
        ..SlipUpdate::default()
    };
    assert!(matches!(
        purchases.edit(id, &office.stranger, update.clone()),
        Err(WorkflowError::PermissionDenied { .. })
    ));
    let edited = purchases.edit(id, &office.owner, update)?;
    assert_eq!(edited.reason(), "tools and spares");
    assert_eq!(edited.items().len(), 2);
    assert_eq!(edited.state(), SlipState::Draft);

    purchases.apply_transition(id, PurchaseAction::Send, &office.owner, None)?;
    assert!(matches!(
        purchases.edit(id, &office.owner, SlipUpdate::default()),
        Err(WorkflowError::NotEditable { state: SlipState::DeptPending })
    ));

    purchases.apply_transition(id, PurchaseAction::Reject, &office.head, Some("too many"))?;
    let first_item = edited.items()[0].id();
    let reworked = purchases.edit(
        id,
        &office.owner,
        SlipUpdate {
            remove_items: vec![first_item],
            ..SlipUpdate::default()
        },
    )?;
    assert_eq!(reworked.state(), SlipState::Draft);
    assert_eq!(reworked.items().len(), 1);
    assert_eq!(reworked.history().last().map(|e| e.action.as_str()), Some("Updated"));

    // removing something that is not there changes nothing
    assert!(matches!(
        purchases.edit(
            id,
            &office.owner,
            SlipUpdate {
                remove_items: vec![99],
                ..SlipUpdate::default()
            }
        ),
        Err(WorkflowError::InvalidItem(_))
    ));
    assert_eq!(purchases.get(id)?.items().len(), 1);
    Ok(())
}

#[test]
fn due_loans_get_a_reminder() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, loans) = office.workflow::<Loan>()?;
    let today = Day::from_ymd(2026, 10, 18).context("bad date")?;
    let tomorrow = Day::from_ymd(2026, 10, 19).context("bad date")?;

    let mut ids = vec![];
    for due in [today, tomorrow] {
        let mut request = new_slip("demo kit")?;
        request.items = vec![
            LineItem::new("Projector", "unit", 1)?
                .set_loan_terms(LoanTerms::new(today).set_expected_return(due)),
        ];
        let id = loans.create(&office.owner, request)?.id();
        loans.apply_transition(id, LoanAction::Send, &office.owner, None)?;
        loans.apply_transition(id, LoanAction::DeptApprove, &office.head, None)?;
        loans.apply_transition(id, LoanAction::DirectorApprove, &office.director, None)?;
        loans.apply_transition(id, LoanAction::WarehouseExport, &office.keeper, None)?;
        ids.push(id);
    }

    let before = office.outbox.sent().len();
    assert_eq!(loans.send_due_reminders(today.to_naive())?, 1);
    let reminder = office.outbox.last().context("no reminder")?;
    assert_eq!(reminder.slip.id(), ids[0]);
    assert_eq!(reminder.recipients, vec!["an@example.com"]);
    assert_eq!(office.outbox.sent().len(), before + 1);

    // returned loans are no longer chased
    loans.return_loan(ids[1], &office.owner, None, vec![])?;
    assert_eq!(loans.send_due_reminders(tomorrow.to_naive())?, 0);
    Ok(())
}

#[test]
fn unknown_slips_and_actions() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, exports) = office.workflow::<Export>()?;

    assert!(matches!(
        exports.apply_transition(404, ExportAction::Send, &office.owner, None),
        Err(WorkflowError::NotFound { id: 404, .. })
    ));
    let id = exports.create(&office.owner, new_slip("named")?)?.id();
    assert!(matches!(
        exports.apply_named(id, "user_return", &office.owner, None),
        Err(WorkflowError::UnknownAction(_))
    ));
    assert_eq!(
        exports.apply_named(id, " send ", &office.owner, None)?.state,
        SlipState::DeptPending
    );
    Ok(())
}

#[test]
fn later_approvers_may_reject_a_purchase_early() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, purchases) = office.workflow::<Purchase>()?;

    let id = purchases.create(&office.owner, new_slip("furniture")?)?.id();
    purchases.apply_transition(id, PurchaseAction::Send, &office.owner, None)?;
    assert!(matches!(
        purchases.apply_transition(id, PurchaseAction::Reject, &office.keeper, None),
        Err(WorkflowError::PermissionDenied { .. })
    ));
    let rejected = purchases.apply_transition(id, PurchaseAction::Reject, &office.director, Some("not now"))?;
    assert_eq!(rejected.from, SlipState::DeptPending);
    assert_eq!(rejected.state, SlipState::Rejected);
    Ok(())
}

#[test]
fn any_later_approver_may_reject_an_export() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, exports) = office.workflow::<Export>()?;

    // department stage: head, warehouse and director all have a say
    for actor in [&office.head, &office.keeper, &office.director] {
        let id = exports.create(&office.owner, new_slip("dispatch")?)?.id();
        exports.apply_transition(id, ExportAction::Send, &office.owner, None)?;
        let rejected = exports.apply_transition(id, ExportAction::Reject, actor, Some("hold"))?;
        assert_eq!(rejected.from, SlipState::DeptPending);
        assert_eq!(rejected.state, SlipState::Rejected);
    }

    // warehouse stage: the head is already behind the slip
    let id = exports.create(&office.owner, new_slip("dispatch")?)?.id();
    exports.apply_transition(id, ExportAction::Send, &office.owner, None)?;
    exports.apply_transition(id, ExportAction::DeptApprove, &office.head, None)?;
    assert!(matches!(
        exports.apply_transition(id, ExportAction::Reject, &office.head, None),
        Err(WorkflowError::PermissionDenied { .. })
    ));
    let rejected = exports.apply_transition(id, ExportAction::Reject, &office.director, None)?;
    assert_eq!(rejected.from, SlipState::WarehousePending);
    Ok(())
}

#[test]
fn director_may_reject_a_loan_before_the_head() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, loans) = office.workflow::<Loan>()?;

    let id = loans.create(&office.owner, new_slip("camera")?)?.id();
    loans.apply_transition(id, LoanAction::Send, &office.owner, None)?;
    let rejected = loans.apply_transition(id, LoanAction::Reject, &office.director, None)?;
    assert_eq!(rejected.from, SlipState::DeptPending);
    assert_eq!(rejected.state, SlipState::Rejected);
    Ok(())
}

#[test]
fn only_an_administrator_rejects_an_approved_loan() -> anyhow::Result<()> {
    let office = Office::new()?;
    let (_dir, loans) = office.workflow::<Loan>()?;

    let id = loans.create(&office.owner, new_slip("crane")?)?.id();
    loans.apply_transition(id, LoanAction::Send, &office.owner, None)?;
    loans.apply_transition(id, LoanAction::DeptApprove, &office.head, None)?;
    loans.apply_transition(id, LoanAction::DirectorApprove, &office.director, None)?;

    for actor in [&office.keeper, &office.director, &office.owner] {
        assert!(matches!(
            loans.apply_transition(id, LoanAction::Reject, actor, None),
            Err(WorkflowError::PermissionDenied { .. })
        ));
    }
    let rejected = loans.apply_transition(id, LoanAction::Reject, &office.admin, Some("vendor recall"))?;
    assert_eq!(rejected.from, SlipState::WarehousePending);
    assert_eq!(rejected.state, SlipState::Rejected);
    Ok(())
}

#[test]
fn submitter_mail_follows_the_slip_kind() -> anyhow::Result<()> {
    let office = Office::new()?;
    let mut on_behalf = new_slip("filed for a colleague")?;
    on_behalf.requester.employee_code = "NV002".into();
    on_behalf.requester.email = "nv002@example.com".into();

    // purchases answer to the account that filed them
    let (_dir, purchases) = office.workflow::<Purchase>()?;
    let id = purchases.create(&office.owner, on_behalf.clone())?.id();
    purchases.apply_transition(id, PurchaseAction::Send, &office.owner, None)?;
    purchases.apply_transition(id, PurchaseAction::DeptApprove, &office.head, None)?;
    let done = purchases.apply_transition(id, PurchaseAction::DirectorApprove, &office.director, None)?;
    assert_eq!(done.recipients, vec!["an@example.com"]);

    // an account with no address on file falls back to the header
    let (_dir, exports) = office.workflow::<Export>()?;
    let id = exports.create(&office.silent, on_behalf.clone())?.id();
    exports.apply_transition(id, ExportAction::Send, &office.silent, None)?;
    let rejected = exports.apply_transition(id, ExportAction::Reject, &office.head, None)?;
    assert_eq!(rejected.recipients, vec!["nv002@example.com"]);

    // loans write to the borrower named on the slip
    let (_dir, loans) = office.workflow::<Loan>()?;
    let id = loans.create(&office.owner, on_behalf)?.id();
    loans.apply_transition(id, LoanAction::Send, &office.owner, None)?;
    let rejected = loans.apply_transition(id, LoanAction::Reject, &office.head, None)?;
    assert_eq!(rejected.recipients, vec!["nv002@example.com"]);
    Ok(())
}

struct Unreachable;

impl NotificationDispatcher for Unreachable {
    fn notify(&self, _: &Notification) -> Result<(), NotificationError> {
        Err(NotificationError::DeliveryFailed("smtp timeout".into()))
    }
}

#[test]
fn failed_delivery_keeps_the_transition() -> anyhow::Result<()> {
    let office = Office::new()?;
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("slips.db"))?;
    let loans: Workflow<Loan, _, _, _> =
        Workflow::new(SledStore::new(Arc::new(db)), office.directory.clone(), Unreachable);

    let id = loans.create(&office.owner, new_slip("offline mail")?)?.id();
    let sent = loans.apply_transition(id, LoanAction::Send, &office.owner, None)?;
    assert_eq!(sent.state, SlipState::DeptPending);
    assert_eq!(loans.get(id)?.state(), SlipState::DeptPending);
    Ok(())
}
