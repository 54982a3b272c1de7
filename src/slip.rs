//! Slip aggregate: the document driven through the approval chain
use super::audit::AuditTrail;
use super::error::WorkflowError;
use super::roles::ActorId;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlipKind {
    #[n(0)]
    Loan,
    #[n(1)]
    Purchase,
    #[n(2)]
    Export,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlipState {
    #[n(0)]
    Draft,
    #[n(1)]
    DeptPending,
    #[n(2)]
    DirectorPending,
    #[n(3)]
    WarehousePending,
    #[n(4)]
    Borrowing,
    #[n(5)]
    Returning,
    #[n(6)]
    Returned,
    #[n(7)]
    Approved,
    #[n(8)]
    Completed,
    #[n(9)]
    Rejected,
}

/// Every action name any slip type understands. Each topology narrows this
/// down to its own closed enum before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Send,
    DeptApprove,
    DirectorApprove,
    WarehouseApprove,
    WarehouseExport,
    UserReturn,
    WarehouseConfirm,
    Reject,
}

/// Approval steps that leave an actor/time stamp on the slip.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    #[n(0)]
    Sent,
    #[n(1)]
    DeptHead,
    #[n(2)]
    Director,
    #[n(3)]
    WarehouseCheck,
    #[n(4)]
    WarehouseOut,
    #[n(5)]
    Returner,
    #[n(6)]
    ActualReturn,
    #[n(7)]
    WarehouseIn,
    #[n(8)]
    Rejected,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

/// Calendar day without a time component (borrow and return dates).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Day(NaiveDate);

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    #[n(0)]
    pub actor: ActorId,
    #[n(1)]
    pub at: TimeStamp,
}

/// Header copied from the employee record at creation time.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    #[n(0)]
    pub employee_code: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub department: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub enum Condition {
    #[n(0)]
    #[default]
    Normal,
    #[n(1)]
    Damaged,
    #[n(2)]
    Other {
        #[n(0)]
        detail: String,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LoanTerms {
    #[n(0)]
    pub borrow_date: Day,
    #[n(1)]
    pub expected_return: Option<Day>,
    #[n(2)]
    pub condition: Condition,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    #[n(0)]
    id: u32, // assigned when attached to a slip
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub unit: String,
    #[n(3)]
    quantity: u32,
    #[n(4)]
    pub note: Option<String>,
    #[n(5)]
    pub loan: Option<LoanTerms>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentPurpose {
    #[n(0)]
    Borrow,
    #[n(1)]
    Return,
    #[n(2)]
    General,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    #[n(0)]
    id: u32,
    #[n(1)]
    pub file: String, // path or key of the uploaded image
    #[n(2)]
    pub purpose: AttachmentPurpose,
    #[n(3)]
    pub uploaded_at: TimeStamp,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Slip {
    #[n(0)]
    id: u64,
    #[n(1)]
    kind: SlipKind,
    #[n(2)]
    owner: ActorId,
    #[n(3)]
    pub(crate) requester: Requester,
    #[n(4)]
    pub(crate) reason: String,
    #[n(5)]
    pub(crate) note: Option<String>,
    #[n(6)]
    created_at: TimeStamp,
    #[n(7)]
    state: SlipState,
    #[n(8)]
    version: u64,
    #[n(9)]
    trail: BTreeMap<Step, Stamp>,
    #[n(10)]
    items: Vec<LineItem>,
    #[n(11)]
    attachments: Vec<Attachment>,
    #[n(12)]
    history: AuditTrail,
    #[n(13)]
    next_item_id: u32,
    #[n(14)]
    next_attachment_id: u32,
}

impl SlipKind {
    pub const ALL: [SlipKind; 3] = [SlipKind::Loan, SlipKind::Purchase, SlipKind::Export];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlipKind::Loan => "loan",
            SlipKind::Purchase => "purchase",
            SlipKind::Export => "export",
        }
    }

    /// Tag used in notification subjects.
    pub fn subject_tag(&self) -> &'static str {
        match self {
            SlipKind::Loan => "LOAN",
            SlipKind::Purchase => "PURCHASE",
            SlipKind::Export => "EXPORT",
        }
    }

    /// The declared state set, in chain order, rejection last.
    pub fn states(&self) -> &'static [SlipState] {
        use SlipState::*;
        match self {
            SlipKind::Loan => &[
                Draft,
                DeptPending,
                DirectorPending,
                WarehousePending,
                Borrowing,
                Returning,
                Returned,
                Rejected,
            ],
            SlipKind::Purchase => &[Draft, DeptPending, DirectorPending, Approved, Rejected],
            SlipKind::Export => &[
                Draft,
                DeptPending,
                WarehousePending,
                DirectorPending,
                Completed,
                Rejected,
            ],
        }
    }

    pub fn has_state(&self, state: SlipState) -> bool {
        self.states().contains(&state)
    }

    pub fn is_terminal(&self, state: SlipState) -> bool {
        matches!(
            (self, state),
            (_, SlipState::Rejected)
                | (SlipKind::Loan, SlipState::Returned)
                | (SlipKind::Purchase, SlipState::Approved)
                | (SlipKind::Export, SlipState::Completed)
        )
    }
}

impl fmt::Display for SlipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SlipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlipState::Draft => "draft",
            SlipState::DeptPending => "dept_pending",
            SlipState::DirectorPending => "director_pending",
            SlipState::WarehousePending => "warehouse_pending",
            SlipState::Borrowing => "borrowing",
            SlipState::Returning => "returning",
            SlipState::Returned => "returned",
            SlipState::Approved => "approved",
            SlipState::Completed => "completed",
            SlipState::Rejected => "rejected",
        }
    }

    /// Human readable label, recorded as the note of most history entries.
    pub fn label(&self) -> &'static str {
        match self {
            SlipState::Draft => "Draft (not yet sent)",
            SlipState::DeptPending => "Awaiting department head approval",
            SlipState::DirectorPending => "Awaiting director approval",
            SlipState::WarehousePending => "Awaiting warehouse keeper",
            SlipState::Borrowing => "On loan (released from warehouse)",
            SlipState::Returning => "Awaiting return confirmation",
            SlipState::Returned => "Returned / completed",
            SlipState::Approved => "Approved",
            SlipState::Completed => "Completed",
            SlipState::Rejected => "Rejected",
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, SlipState::Draft | SlipState::Rejected)
    }
}

impl fmt::Display for SlipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlipState {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "draft" => SlipState::Draft,
            "dept_pending" => SlipState::DeptPending,
            "director_pending" => SlipState::DirectorPending,
            "warehouse_pending" => SlipState::WarehousePending,
            "borrowing" => SlipState::Borrowing,
            "returning" => SlipState::Returning,
            "returned" => SlipState::Returned,
            "approved" => SlipState::Approved,
            "completed" => SlipState::Completed,
            "rejected" => SlipState::Rejected,
            other => return Err(WorkflowError::UnknownState(other.to_string())),
        };
        Ok(state)
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Send => "send",
            Action::DeptApprove => "dept_approve",
            Action::DirectorApprove => "director_approve",
            Action::WarehouseApprove => "warehouse_approve",
            Action::WarehouseExport => "warehouse_export",
            Action::UserReturn => "user_return",
            Action::WarehouseConfirm => "warehouse_confirm",
            Action::Reject => "reject",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Day {
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }
    pub fn to_naive(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for Day {
    fn from(value: NaiveDate) -> Self {
        Day(value)
    }
}

impl<C> minicbor::Encode<C> for Day {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Day {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(Day)
            .ok_or(minicbor::decode::Error::message("day out of range"))
    }
}

impl Condition {
    /// Display text, `Other` falls back to its detail.
    pub fn describe(&self) -> &str {
        match self {
            Condition::Normal => "Normal",
            Condition::Damaged => "Damaged",
            Condition::Other { detail } if !detail.trim().is_empty() => detail,
            Condition::Other { .. } => "Other",
        }
    }
}

impl LoanTerms {
    pub fn new(borrow_date: Day) -> Self {
        Self {
            borrow_date,
            expected_return: None,
            condition: Condition::Normal,
        }
    }
    pub fn set_expected_return(mut self, day: Day) -> Self {
        self.expected_return = Some(day);
        self
    }
    pub fn set_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }
}

impl LineItem {
    pub fn new(name: &str, unit: &str, quantity: u32) -> Result<Self, WorkflowError> {
        if name.trim().is_empty() {
            return Err(WorkflowError::InvalidItem("item name is empty".into()));
        }
        if quantity == 0 {
            return Err(WorkflowError::InvalidItem(format!(
                "quantity of `{}` must be at least 1",
                name.trim()
            )));
        }

        Ok(Self {
            id: 0,
            name: name.trim().to_string(),
            unit: unit.trim().to_string(),
            quantity,
            note: None,
            loan: None,
        })
    }
    pub fn set_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
    pub fn set_loan_terms(mut self, terms: LoanTerms) -> Self {
        self.loan = Some(terms);
        self
    }
    pub fn id(&self) -> u32 {
        self.id
    }
    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

impl Attachment {
    pub fn new(file: &str, purpose: AttachmentPurpose) -> Self {
        Self {
            id: 0,
            file: file.to_string(),
            purpose,
            uploaded_at: TimeStamp::now(),
        }
    }
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Slip {
    pub(crate) fn new(
        id: u64,
        kind: SlipKind,
        owner: ActorId,
        requester: Requester,
        reason: String,
        note: Option<String>,
    ) -> Self {
        Self {
            id,
            kind,
            owner,
            requester,
            reason,
            note,
            created_at: TimeStamp::now(),
            state: SlipState::Draft,
            version: 0,
            trail: BTreeMap::new(),
            items: vec![],
            attachments: vec![],
            history: AuditTrail::new(),
            next_item_id: 1,
            next_attachment_id: 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn kind(&self) -> SlipKind {
        self.kind
    }
    pub fn owner(&self) -> &ActorId {
        &self.owner
    }
    pub fn requester(&self) -> &Requester {
        &self.requester
    }
    pub fn reason(&self) -> &str {
        &self.reason
    }
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
    pub fn created_at(&self) -> TimeStamp {
        self.created_at
    }
    pub fn state(&self) -> SlipState {
        self.state
    }
    pub fn version(&self) -> u64 {
        self.version
    }
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
    pub fn history(&self) -> &AuditTrail {
        &self.history
    }
    pub fn stamp(&self, step: Step) -> Option<&Stamp> {
        self.trail.get(&step)
    }
    pub fn rejected_at(&self) -> Option<TimeStamp> {
        self.stamp(Step::Rejected).map(|s| s.at)
    }
    pub fn actual_return_at(&self) -> Option<TimeStamp> {
        self.stamp(Step::ActualReturn).map(|s| s.at)
    }
    /// `#0042` style reference used in subjects.
    pub fn reference(&self) -> String {
        format!("#{:04}", self.id)
    }

    pub(crate) fn set_state(&mut self, state: SlipState) {
        self.state = state;
    }
    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
    pub(crate) fn record(&mut self, step: Step, stamp: Stamp) {
        self.trail.insert(step, stamp);
    }
    pub(crate) fn history_mut(&mut self) -> &mut AuditTrail {
        &mut self.history
    }

    pub(crate) fn push_item(&mut self, mut item: LineItem) -> Result<(), WorkflowError> {
        match (self.kind, &item.loan) {
            (SlipKind::Loan, None) => item.loan = Some(LoanTerms::new(Day::today())),
            (SlipKind::Loan, Some(_)) => {}
            (_, Some(_)) => {
                return Err(WorkflowError::InvalidItem(format!(
                    "loan terms on a {} slip item `{}`",
                    self.kind, item.name
                )));
            }
            (_, None) => {}
        }
        item.id = self.next_item_id;
        self.next_item_id += 1;
        self.items.push(item);
        Ok(())
    }
    pub(crate) fn remove_item(&mut self, id: u32) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        before != self.items.len()
    }
    pub(crate) fn push_attachment(&mut self, mut attachment: Attachment) {
        attachment.id = self.next_attachment_id;
        self.next_attachment_id += 1;
        self.attachments.push(attachment);
    }
    pub(crate) fn remove_attachment(&mut self, id: u32) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.id != id);
        before != self.attachments.len()
    }
}
