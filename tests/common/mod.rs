//! Shared fixtures: a sled store in a temp dir plus a small office of
//! accounts holding each role.
#![allow(dead_code)]

use slip_approval::{
    directory::Directory,
    notify::RecordingDispatcher,
    roles::{ActorId, Role},
    slip::{LineItem, Requester},
    store::SledStore,
    workflow::{NewSlip, Workflow},
};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

pub type TestWorkflow<T> = Workflow<T, SledStore, Arc<Directory>, Arc<RecordingDispatcher>>;

pub struct Office {
    pub owner: ActorId,
    pub head: ActorId,
    pub director: ActorId,
    pub keeper: ActorId,
    pub admin: ActorId,
    pub stranger: ActorId,
    /// Account without an email address.
    pub silent: ActorId,
    pub directory: Arc<Directory>,
    pub outbox: Arc<RecordingDispatcher>,
}

impl Office {
    pub fn new() -> anyhow::Result<Self> {
        let mut dir = Directory::new();
        let owner = dir.register("an", "an@example.com", &[])?;
        let head = dir.register("binh", "head@example.com", &[Role::DepartmentHead])?;
        let director = dir.register("chi", "director@example.com", &[Role::Director])?;
        let keeper = dir.register("dung", "warehouse@example.com", &[Role::WarehouseKeeper])?;
        let admin = dir.register("root", "admin@example.com", &[Role::Administrator])?;
        let stranger = dir.register("em", "em@example.com", &[])?;
        let silent = dir.register("giang", "", &[])?;

        Ok(Self {
            owner,
            head,
            director,
            keeper,
            admin,
            stranger,
            silent,
            directory: Arc::new(dir),
            outbox: Arc::new(RecordingDispatcher::new()),
        })
    }

    /// Sled holds a file lock, so every test gets its own database.
    pub fn workflow<T>(&self) -> anyhow::Result<(TempDir, TestWorkflow<T>)>
    where
        T: slip_approval::topology::Topology,
    {
        let temp_dir = tempdir()?;
        let db = sled::open(temp_dir.path().join("slips.db"))?;
        let store = SledStore::new(Arc::new(db));
        Ok((
            temp_dir,
            Workflow::new(store, self.directory.clone(), self.outbox.clone()),
        ))
    }
}

pub fn requester() -> Requester {
    Requester {
        employee_code: "NV001".into(),
        name: "Nguyen Van An".into(),
        email: "an@example.com".into(),
        title: "Engineer".into(),
        department: "R&D".into(),
    }
}

pub fn new_slip(reason: &str) -> anyhow::Result<NewSlip> {
    Ok(NewSlip {
        requester: requester(),
        reason: reason.into(),
        note: None,
        items: vec![LineItem::new("Oscilloscope", "unit", 1)?],
        attachments: vec![],
    })
}
