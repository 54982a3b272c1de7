//! Fixed approval chains for each slip type.
//!
//! A topology is a table of [`Transition`] rows. The engine in
//! [`crate::workflow`] only ever moves a slip along a row of its table, so the
//! set of reachable states is exactly what is written down here.
use super::error::WorkflowError;
use super::roles::Role;
use super::slip::{Action, SlipKind, SlipState, Step};
use std::fmt;
use std::str::FromStr;

/// Who may fire a transition. Administrators pass every guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Role(Role),
    Owner,
    OwnerOr(Role),
    /// Any one of the roles, used where every later approver may refuse.
    AnyOf(&'static [Role]),
    AdminOnly,
}

/// Who hears about a transition once it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    Role(Role),
    Submitter,
}

/// Where the history note comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSource {
    TargetLabel,
    Caller,
}

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: SlipState,
    pub action: Action,
    pub guard: Guard,
    pub to: SlipState,
    pub stamps: &'static [Step],
    pub notify: Recipients,
    pub label: &'static str,
    pub note: NoteSource,
    pub subject: &'static str,
    pub message: &'static str,
}

pub trait Topology: Send + Sync + 'static {
    const KIND: SlipKind;
    type Action: Copy + fmt::Debug + FromStr<Err = WorkflowError> + Into<Action>;

    fn transitions() -> &'static [Transition];

    /// The row for `action` out of `state`, if the chain has one.
    fn find(state: SlipState, action: Action) -> Option<&'static Transition> {
        Self::transitions()
            .iter()
            .find(|t| t.from == state && t.action == action)
    }

    fn actions_from(state: SlipState) -> Vec<Action> {
        Self::transitions()
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.action)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Loan;
#[derive(Debug, Clone, Copy)]
pub struct Purchase;
#[derive(Debug, Clone, Copy)]
pub struct Export;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanAction {
    Send,
    DeptApprove,
    DirectorApprove,
    WarehouseExport,
    UserReturn,
    WarehouseConfirm,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseAction {
    Send,
    DeptApprove,
    DirectorApprove,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAction {
    Send,
    DeptApprove,
    WarehouseApprove,
    DirectorApprove,
    Reject,
}

const SEND_SUBJECT: &str = "awaiting department head approval";
const SEND_MESSAGE: &str = "A new slip was submitted and needs your approval.";
const REJECT_SUBJECT: &str = "was rejected";
const REJECT_MESSAGE: &str = "Your slip was rejected.";

const fn send(from: SlipState) -> Transition {
    Transition {
        from,
        action: Action::Send,
        guard: Guard::Owner,
        to: SlipState::DeptPending,
        stamps: &[Step::Sent],
        notify: Recipients::Role(Role::DepartmentHead),
        label: "Sent for approval",
        note: NoteSource::TargetLabel,
        subject: SEND_SUBJECT,
        message: SEND_MESSAGE,
    }
}

const fn reject(from: SlipState, guard: Guard) -> Transition {
    Transition {
        from,
        action: Action::Reject,
        guard,
        to: SlipState::Rejected,
        stamps: &[Step::Rejected],
        notify: Recipients::Submitter,
        label: "Rejected",
        note: NoteSource::Caller,
        subject: REJECT_SUBJECT,
        message: REJECT_MESSAGE,
    }
}

static LOAN_TABLE: [Transition; 13] = [
    send(SlipState::Draft),
    send(SlipState::Rejected),
    Transition {
        from: SlipState::DeptPending,
        action: Action::DeptApprove,
        guard: Guard::Role(Role::DepartmentHead),
        to: SlipState::DirectorPending,
        stamps: &[Step::DeptHead],
        notify: Recipients::Role(Role::Director),
        label: "Department head approved",
        note: NoteSource::TargetLabel,
        subject: "awaiting director approval",
        message: "The department head approved this loan. Director approval is requested.",
    },
    Transition {
        from: SlipState::DirectorPending,
        action: Action::DirectorApprove,
        guard: Guard::Role(Role::Director),
        to: SlipState::WarehousePending,
        stamps: &[Step::Director],
        notify: Recipients::Role(Role::WarehouseKeeper),
        label: "Director approved",
        note: NoteSource::TargetLabel,
        subject: "ready for warehouse release",
        message: "The director approved this loan. Please prepare the items for release.",
    },
    Transition {
        from: SlipState::WarehousePending,
        action: Action::WarehouseExport,
        guard: Guard::Role(Role::WarehouseKeeper),
        to: SlipState::Borrowing,
        stamps: &[Step::WarehouseOut],
        notify: Recipients::Submitter,
        label: "Released from warehouse",
        note: NoteSource::TargetLabel,
        subject: "released from warehouse",
        message: "The items were released from the warehouse and handed over to you.",
    },
    Transition {
        from: SlipState::Borrowing,
        action: Action::UserReturn,
        guard: Guard::OwnerOr(Role::WarehouseKeeper),
        to: SlipState::Returning,
        stamps: &[Step::Returner, Step::ActualReturn],
        notify: Recipients::Role(Role::WarehouseKeeper),
        label: "Return requested",
        note: NoteSource::Caller,
        subject: "awaiting return confirmation",
        message: "The borrower reported the items as returned. Please confirm receipt.",
    },
    Transition {
        from: SlipState::Returning,
        action: Action::WarehouseConfirm,
        guard: Guard::Role(Role::WarehouseKeeper),
        to: SlipState::Returned,
        stamps: &[Step::WarehouseIn],
        notify: Recipients::Submitter,
        label: "Warehouse confirmed return",
        note: NoteSource::TargetLabel,
        subject: "return completed",
        message: "The warehouse confirmed the return. This loan is complete.",
    },
    reject(SlipState::Draft, Guard::AdminOnly),
    reject(SlipState::DeptPending, Guard::AnyOf(&[Role::DepartmentHead, Role::Director])),
    reject(SlipState::DirectorPending, Guard::Role(Role::Director)),
    // past the approvals only an administrator can call a loan off
    reject(SlipState::WarehousePending, Guard::AdminOnly),
    reject(SlipState::Borrowing, Guard::AdminOnly),
    reject(SlipState::Returning, Guard::AdminOnly),
];

static PURCHASE_TABLE: [Transition; 6] = [
    send(SlipState::Draft),
    send(SlipState::Rejected),
    Transition {
        from: SlipState::DeptPending,
        action: Action::DeptApprove,
        guard: Guard::Role(Role::DepartmentHead),
        to: SlipState::DirectorPending,
        stamps: &[Step::DeptHead],
        notify: Recipients::Role(Role::Director),
        label: "Department head approved",
        note: NoteSource::TargetLabel,
        subject: "awaiting director approval",
        message: "The department head approved this purchase request. Final approval is requested.",
    },
    Transition {
        from: SlipState::DirectorPending,
        action: Action::DirectorApprove,
        guard: Guard::Role(Role::Director),
        to: SlipState::Approved,
        stamps: &[Step::Director],
        notify: Recipients::Submitter,
        label: "Director approved (complete)",
        note: NoteSource::TargetLabel,
        subject: "was approved",
        message: "Your purchase request was approved by the board of directors.",
    },
    reject(SlipState::DeptPending, Guard::AnyOf(&[Role::DepartmentHead, Role::Director])),
    reject(SlipState::DirectorPending, Guard::Role(Role::Director)),
];

static EXPORT_TABLE: [Transition; 8] = [
    send(SlipState::Draft),
    send(SlipState::Rejected),
    Transition {
        from: SlipState::DeptPending,
        action: Action::DeptApprove,
        guard: Guard::Role(Role::DepartmentHead),
        to: SlipState::WarehousePending,
        stamps: &[Step::DeptHead],
        notify: Recipients::Role(Role::WarehouseKeeper),
        label: "Department head approved",
        note: NoteSource::TargetLabel,
        subject: "awaiting warehouse check",
        message: "The department head approved this export. Please check stock.",
    },
    Transition {
        from: SlipState::WarehousePending,
        action: Action::WarehouseApprove,
        guard: Guard::Role(Role::WarehouseKeeper),
        to: SlipState::DirectorPending,
        stamps: &[Step::WarehouseCheck],
        notify: Recipients::Role(Role::Director),
        label: "Warehouse keeper approved (stock available)",
        note: NoteSource::TargetLabel,
        subject: "awaiting director approval",
        message: "The warehouse keeper confirmed stock for this export. Director approval is requested.",
    },
    Transition {
        from: SlipState::DirectorPending,
        action: Action::DirectorApprove,
        guard: Guard::Role(Role::Director),
        to: SlipState::Completed,
        stamps: &[Step::Director],
        notify: Recipients::Submitter,
        label: "Director approved (complete)",
        note: NoteSource::TargetLabel,
        subject: "was approved",
        message: "Your export request was approved at every level.",
    },
    reject(
        SlipState::DeptPending,
        Guard::AnyOf(&[Role::DepartmentHead, Role::WarehouseKeeper, Role::Director]),
    ),
    reject(SlipState::WarehousePending, Guard::AnyOf(&[Role::WarehouseKeeper, Role::Director])),
    reject(SlipState::DirectorPending, Guard::Role(Role::Director)),
];

impl Topology for Loan {
    const KIND: SlipKind = SlipKind::Loan;
    type Action = LoanAction;

    fn transitions() -> &'static [Transition] {
        &LOAN_TABLE
    }
}

impl Topology for Purchase {
    const KIND: SlipKind = SlipKind::Purchase;
    type Action = PurchaseAction;

    fn transitions() -> &'static [Transition] {
        &PURCHASE_TABLE
    }
}

impl Topology for Export {
    const KIND: SlipKind = SlipKind::Export;
    type Action = ExportAction;

    fn transitions() -> &'static [Transition] {
        &EXPORT_TABLE
    }
}

impl From<LoanAction> for Action {
    fn from(value: LoanAction) -> Self {
        match value {
            LoanAction::Send => Action::Send,
            LoanAction::DeptApprove => Action::DeptApprove,
            LoanAction::DirectorApprove => Action::DirectorApprove,
            LoanAction::WarehouseExport => Action::WarehouseExport,
            LoanAction::UserReturn => Action::UserReturn,
            LoanAction::WarehouseConfirm => Action::WarehouseConfirm,
            LoanAction::Reject => Action::Reject,
        }
    }
}

impl From<PurchaseAction> for Action {
    fn from(value: PurchaseAction) -> Self {
        match value {
            PurchaseAction::Send => Action::Send,
            PurchaseAction::DeptApprove => Action::DeptApprove,
            PurchaseAction::DirectorApprove => Action::DirectorApprove,
            PurchaseAction::Reject => Action::Reject,
        }
    }
}

impl From<ExportAction> for Action {
    fn from(value: ExportAction) -> Self {
        match value {
            ExportAction::Send => Action::Send,
            ExportAction::DeptApprove => Action::DeptApprove,
            ExportAction::WarehouseApprove => Action::WarehouseApprove,
            ExportAction::DirectorApprove => Action::DirectorApprove,
            ExportAction::Reject => Action::Reject,
        }
    }
}

impl FromStr for LoanAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(LoanAction::Send),
            "dept_approve" => Ok(LoanAction::DeptApprove),
            "director_approve" => Ok(LoanAction::DirectorApprove),
            "warehouse_export" => Ok(LoanAction::WarehouseExport),
            "user_return" => Ok(LoanAction::UserReturn),
            "warehouse_confirm" => Ok(LoanAction::WarehouseConfirm),
            "reject" => Ok(LoanAction::Reject),
            other => Err(WorkflowError::UnknownAction(other.to_string())),
        }
    }
}

impl FromStr for PurchaseAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(PurchaseAction::Send),
            "dept_approve" => Ok(PurchaseAction::DeptApprove),
            "director_approve" => Ok(PurchaseAction::DirectorApprove),
            "reject" => Ok(PurchaseAction::Reject),
            other => Err(WorkflowError::UnknownAction(other.to_string())),
        }
    }
}

impl FromStr for ExportAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(ExportAction::Send),
            "dept_approve" => Ok(ExportAction::DeptApprove),
            "warehouse_approve" => Ok(ExportAction::WarehouseApprove),
            "director_approve" => Ok(ExportAction::DirectorApprove),
            "reject" => Ok(ExportAction::Reject),
            other => Err(WorkflowError::UnknownAction(other.to_string())),
        }
    }
}
