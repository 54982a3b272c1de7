//! Drives one loan slip from draft to returned, logging each step.
//!
//! Settings come from `slips.toml` when present and `SLIPS_*` variables.
use anyhow::Context;
use slip_approval::{
    config::WorkflowConfig,
    directory::{Directory, Employee, EmployeeDirectory},
    logging,
    notify::{LogDispatcher, Outbox},
    roles::Role,
    slip::{Day, LineItem, LoanTerms, Requester},
    topology::{Loan, LoanAction},
    workflow::{NewSlip, Workflow},
};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = WorkflowConfig::load(Some("slips")).context("failed to load settings")?;
    logging::init(&config.log_filter)?;

    let mut accounts = Directory::new();
    let owner = accounts.register("an", "an@example.com", &[])?;
    let head = accounts.register("binh", "head@example.com", &[Role::DepartmentHead])?;
    let director = accounts.register("chi", "director@example.com", &[Role::Director])?;
    let keeper = accounts.register("dung", "warehouse@example.com", &[Role::WarehouseKeeper])?;

    let mut staff = EmployeeDirectory::new();
    staff.insert(Employee {
        code: "NV001".into(),
        name: "Nguyen Van An".into(),
        email: "an@example.com".into(),
        title: "Field engineer".into(),
        department: "R&D".into(),
    });
    let employee = staff.find_by_code("NV001").context("employee NV001 missing")?;

    let outbox = Outbox::spawn(LogDispatcher, config.outbox_capacity);
    let loans: Workflow<Loan, _, _, _> =
        Workflow::new(config.open_store()?, Arc::new(accounts), outbox).with_links(config.links());

    let today = Day::today();
    let item = LineItem::new("Thermal camera", "unit", 1)?
        .set_loan_terms(LoanTerms::new(today).set_expected_return(today));
    let slip = loans.create(
        &owner,
        NewSlip {
            requester: Requester::from(employee),
            reason: "site inspection".into(),
            items: vec![item],
            ..NewSlip::default()
        },
    )?;
    let id = slip.id();

    for (action, actor) in [
        (LoanAction::Send, &owner),
        (LoanAction::DeptApprove, &head),
        (LoanAction::DirectorApprove, &director),
        (LoanAction::WarehouseExport, &keeper),
    ] {
        let outcome = loans.apply_transition(id, action, actor, None)?;
        tracing::info!(slip = %outcome.slip.reference(), state = %outcome.state, "step done");
    }

    let reminded = loans.send_due_reminders(today.to_naive())?;
    tracing::info!(reminded, "reminders sent");

    loans.return_loan(id, &owner, Some("returned in good condition"), vec!["return/camera.jpg".into()])?;
    let done = loans.apply_transition(id, LoanAction::WarehouseConfirm, &keeper, None)?;

    for entry in done.slip.history().iter() {
        tracing::info!(
            seq = entry.seq,
            action = %entry.action,
            note = entry.note.as_deref().unwrap_or(""),
            "history"
        );
    }
    Ok(())
}
