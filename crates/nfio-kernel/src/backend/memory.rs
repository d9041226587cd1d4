//! In-process simulated orchestrator.
//!
//! Used by the shell and by tests. Instances start `Running` immediately;
//! all state is lost when dropped.
//!
//! Fault injection works per operation:
//! - [`MemoryOrchestrator::fail_next`] fails the next call before it has any
//!   effect.
//! - [`MemoryOrchestrator::lose_next_reply`] applies the next call and then
//!   reports `Timeout`, the way a reply lost on the wire looks to a caller.
//! - [`MemoryOrchestrator::set_latency`] delays every call.
//!
//! Destroying an instance does not remove its channels. A real backend may
//! leave such dangling channels behind too.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use nfio_types::{AttrValue, ChannelName, InstanceId, InstanceStatus, Record};

use super::{
    BackendError, BackendListing, BackendResult, ChannelInfo, InstanceInfo, OrchestrationBackend,
    Outcome, Removal,
};

/// Backend operation, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Instantiate,
    Destroy,
    GetAttr,
    SetAttr,
    Connect,
    Disconnect,
    ListInstances,
    ListChannels,
}

#[derive(Debug, Clone)]
enum Fault {
    Fail(BackendError),
    LoseReply,
}

#[derive(Debug, Clone)]
struct SimInstance {
    id: InstanceId,
    nf_type: String,
    name: String,
    status: InstanceStatus,
    ip: String,
    config: Record,
    extra: HashMap<String, AttrValue>,
}

impl SimInstance {
    fn info(&self) -> InstanceInfo {
        let mut extension_keys: Vec<String> = self.extra.keys().cloned().collect();
        extension_keys.sort();
        InstanceInfo {
            id: self.id.clone(),
            nf_type: self.nf_type.clone(),
            name: self.name.clone(),
            status: self.status,
            extension_keys,
        }
    }
}

#[derive(Debug, Default)]
struct World {
    /// Creation order.
    instances: Vec<SimInstance>,
    channels: Vec<ChannelInfo>,
    next_host: u32,
}

impl World {
    fn by_id(&self, id: &InstanceId) -> Option<&SimInstance> {
        self.instances.iter().find(|i| &i.id == id)
    }

    fn by_id_mut(&mut self, id: &InstanceId) -> Option<&mut SimInstance> {
        self.instances.iter_mut().find(|i| &i.id == id)
    }
}

#[derive(Debug, Default)]
struct Faults {
    pending: HashMap<Op, VecDeque<Fault>>,
    calls: HashMap<Op, usize>,
    latency: Option<Duration>,
    unordered: bool,
}

/// Simulated orchestration backend.
#[derive(Debug, Default)]
pub struct MemoryOrchestrator {
    world: Mutex<World>,
    faults: Mutex<Faults>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Fail the next call of `op` with `error`, before it takes effect.
    pub fn fail_next(&self, op: Op, error: BackendError) {
        self.push_fault(op, Fault::Fail(error));
    }

    /// Apply the next call of `op`, then report `Timeout`.
    pub fn lose_next_reply(&self, op: Op) {
        self.push_fault(op, Fault::LoseReply);
    }

    fn push_fault(&self, op: Op, fault: Fault) {
        self.faults.lock().pending.entry(op).or_default().push_back(fault);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().latency = latency;
    }

    /// Report listings as unordered (and in reverse creation order).
    pub fn set_unordered(&self, unordered: bool) {
        self.faults.lock().unordered = unordered;
    }

    /// Number of calls of `op` seen so far, including failed ones.
    pub fn calls(&self, op: Op) -> usize {
        self.faults.lock().calls.get(&op).copied().unwrap_or(0)
    }

    // ========================================================================
    // Out-of-band changes
    // ========================================================================

    /// Change an instance's status as if its workload had changed on its own.
    pub fn set_status(&self, nf_type: &str, name: &str, status: InstanceStatus) -> bool {
        let mut world = self.world.lock();
        match world
            .instances
            .iter_mut()
            .find(|i| i.nf_type == nf_type && i.name == name)
        {
            Some(inst) => {
                inst.status = status;
                true
            }
            None => false,
        }
    }

    /// Attach an attribute outside any type schema to an instance.
    pub fn seed_extension(&self, nf_type: &str, name: &str, key: &str, value: AttrValue) -> bool {
        let mut world = self.world.lock();
        match world
            .instances
            .iter_mut()
            .find(|i| i.nf_type == nf_type && i.name == name)
        {
            Some(inst) => {
                inst.extra.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.world.lock().instances.len()
    }

    pub fn channel_count(&self) -> usize {
        self.world.lock().channels.len()
    }

    // ========================================================================
    // Call plumbing
    // ========================================================================

    /// Count the call, apply latency and take the pending fault, if any.
    async fn enter(&self, op: Op) -> BackendResult<bool> {
        let (latency, fault) = {
            let mut faults = self.faults.lock();
            *faults.calls.entry(op).or_default() += 1;
            let fault = faults.pending.get_mut(&op).and_then(|q| q.pop_front());
            (faults.latency, fault)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match fault {
            Some(Fault::Fail(e)) => Err(e),
            Some(Fault::LoseReply) => Ok(true),
            None => Ok(false),
        }
    }

    fn reply<T>(lose: bool, value: T) -> BackendResult<T> {
        if lose { Err(BackendError::Timeout) } else { Ok(value) }
    }

    fn listing<T>(&self, mut items: Vec<T>) -> BackendListing<T> {
        if self.faults.lock().unordered {
            items.reverse();
            BackendListing::unordered(items)
        } else {
            BackendListing::ordered(items)
        }
    }
}

fn unknown_instance(id: &InstanceId) -> BackendError {
    BackendError::rejected(format!("no such instance: {id}"))
}

#[async_trait]
impl OrchestrationBackend for MemoryOrchestrator {
    fn name(&self) -> &str {
        "memory"
    }

    async fn instantiate(&self, nf_type: &str, name: &str) -> BackendResult<Outcome<InstanceInfo>> {
        let lose = self.enter(Op::Instantiate).await?;
        let mut world = self.world.lock();
        if let Some(existing) = world
            .instances
            .iter()
            .find(|i| i.nf_type == nf_type && i.name == name)
        {
            return Self::reply(lose, Outcome::AlreadyPresent(existing.info()));
        }

        world.next_host += 1;
        let host = world.next_host;
        let inst = SimInstance {
            id: InstanceId::new(Uuid::now_v7().to_string()),
            nf_type: nf_type.to_string(),
            name: name.to_string(),
            status: InstanceStatus::Running,
            ip: format!("10.0.{}.{}", host / 250, host % 250 + 2),
            config: Record::new(),
            extra: HashMap::new(),
        };
        let info = inst.info();
        world.instances.push(inst);
        Self::reply(lose, Outcome::Created(info))
    }

    async fn destroy(&self, id: &InstanceId) -> BackendResult<Removal> {
        let lose = self.enter(Op::Destroy).await?;
        let mut world = self.world.lock();
        let before = world.instances.len();
        world.instances.retain(|i| &i.id != id);
        let removal = if world.instances.len() < before {
            Removal::Removed
        } else {
            Removal::AlreadyAbsent
        };
        Self::reply(lose, removal)
    }

    async fn get_attr(&self, id: &InstanceId, key: &str) -> BackendResult<AttrValue> {
        let lose = self.enter(Op::GetAttr).await?;
        let world = self.world.lock();
        let inst = world.by_id(id).ok_or_else(|| unknown_instance(id))?;
        let value = match key {
            "status" => AttrValue::Status(inst.status),
            "id" => AttrValue::Text(inst.id.to_string()),
            "ip" if inst.status == InstanceStatus::Running => AttrValue::Text(inst.ip.clone()),
            "ip" => {
                return Err(BackendError::rejected(format!(
                    "{} is {}, no address assigned",
                    inst.name, inst.status
                )));
            }
            "config" => AttrValue::Record(inst.config.clone()),
            "action" => return Err(BackendError::rejected("action is write-only")),
            other => inst
                .extra
                .get(other)
                .cloned()
                .ok_or_else(|| BackendError::rejected(format!("{other} is not set")))?,
        };
        Self::reply(lose, value)
    }

    async fn set_attr(&self, id: &InstanceId, key: &str, value: AttrValue) -> BackendResult<()> {
        let lose = self.enter(Op::SetAttr).await?;
        let mut world = self.world.lock();
        let inst = world.by_id_mut(id).ok_or_else(|| unknown_instance(id))?;
        match (key, value) {
            ("status" | "id" | "ip", _) => {
                return Err(BackendError::rejected(format!("{key} is read-only")));
            }
            ("action", AttrValue::Action(action)) => {
                use nfio_types::Action;
                match (action, inst.status) {
                    (Action::Pause, s) if s != InstanceStatus::Running => {
                        return Err(BackendError::rejected(format!("cannot pause a {s} instance")));
                    }
                    (Action::Unpause, s) if s != InstanceStatus::Paused => {
                        return Err(BackendError::rejected(format!("cannot unpause a {s} instance")));
                    }
                    _ => inst.status = action.resulting_status(),
                }
            }
            ("config", AttrValue::Record(record)) => inst.config = record,
            ("action" | "config", other) => {
                return Err(BackendError::rejected(format!(
                    "{key} does not accept a {} value",
                    other.kind_name()
                )));
            }
            (other, value) => {
                inst.extra.insert(other.to_string(), value);
            }
        }
        Self::reply(lose, ())
    }

    async fn connect(&self, a: &InstanceId, b: &InstanceId) -> BackendResult<Outcome<ChannelInfo>> {
        let lose = self.enter(Op::Connect).await?;
        let mut world = self.world.lock();
        for id in [a, b] {
            let inst = world.by_id(id).ok_or_else(|| unknown_instance(id))?;
            if inst.status != InstanceStatus::Running {
                return Err(BackendError::rejected(format!(
                    "{} is {}, not running",
                    inst.name, inst.status
                )));
            }
        }
        if let Some(existing) = world.channels.iter().find(|c| {
            (&c.source == a && &c.destination == b) || (&c.source == b && &c.destination == a)
        }) {
            return Self::reply(lose, Outcome::AlreadyPresent(existing.clone()));
        }

        let channel = ChannelInfo {
            name: ChannelName::new(format!("ch-{}", Uuid::now_v7().simple())),
            source: a.clone(),
            destination: b.clone(),
        };
        world.channels.push(channel.clone());
        Self::reply(lose, Outcome::Created(channel))
    }

    async fn disconnect(&self, name: &ChannelName) -> BackendResult<Removal> {
        let lose = self.enter(Op::Disconnect).await?;
        let mut world = self.world.lock();
        let before = world.channels.len();
        world.channels.retain(|c| &c.name != name);
        let removal = if world.channels.len() < before {
            Removal::Removed
        } else {
            Removal::AlreadyAbsent
        };
        Self::reply(lose, removal)
    }

    async fn list_instances(&self, nf_type: &str) -> BackendResult<BackendListing<InstanceInfo>> {
        let lose = self.enter(Op::ListInstances).await?;
        let items: Vec<InstanceInfo> = self
            .world
            .lock()
            .instances
            .iter()
            .filter(|i| i.nf_type == nf_type)
            .map(SimInstance::info)
            .collect();
        Self::reply(lose, self.listing(items))
    }

    async fn list_channels(&self) -> BackendResult<BackendListing<ChannelInfo>> {
        let lose = self.enter(Op::ListChannels).await?;
        let items = self.world.lock().channels.clone();
        Self::reply(lose, self.listing(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_instantiate_is_keyed_by_type_and_name() {
        let orch = MemoryOrchestrator::new();
        let first = orch.instantiate("firewall", "fw1").await.unwrap();
        let second = orch.instantiate("firewall", "fw1").await.unwrap();
        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.get().id, second.get().id);

        // Same name, other type: a different instance.
        let other = orch.instantiate("proxy", "fw1").await.unwrap();
        assert!(other.was_created());
        assert_eq!(orch.instance_count(), 2);
    }

    #[tokio::test]
    async fn test_destroy_twice() {
        let orch = MemoryOrchestrator::new();
        let info = orch.instantiate("firewall", "fw1").await.unwrap().into_inner();
        assert_eq!(orch.destroy(&info.id).await.unwrap(), Removal::Removed);
        assert_eq!(orch.destroy(&info.id).await.unwrap(), Removal::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_connect_either_order_is_one_channel() {
        let orch = MemoryOrchestrator::new();
        let a = orch.instantiate("firewall", "fw1").await.unwrap().into_inner();
        let b = orch.instantiate("proxy", "p1").await.unwrap().into_inner();

        let ab = orch.connect(&a.id, &b.id).await.unwrap();
        let ba = orch.connect(&b.id, &a.id).await.unwrap();
        assert!(ab.was_created());
        assert!(!ba.was_created());
        assert_eq!(ab.get().name, ba.get().name);
        assert_eq!(orch.channel_count(), 1);

        let name = ab.into_inner().name;
        assert_eq!(orch.disconnect(&name).await.unwrap(), Removal::Removed);
        assert_eq!(orch.disconnect(&name).await.unwrap(), Removal::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_actions_drive_status_and_ip() {
        let orch = MemoryOrchestrator::new();
        let info = orch.instantiate("firewall", "fw1").await.unwrap().into_inner();
        assert!(matches!(orch.get_attr(&info.id, "ip").await.unwrap(), AttrValue::Text(_)));

        orch.set_attr(&info.id, "action", AttrValue::Action(nfio_types::Action::Pause))
            .await
            .unwrap();
        assert_eq!(
            orch.get_attr(&info.id, "status").await.unwrap(),
            AttrValue::Status(InstanceStatus::Paused)
        );
        assert!(matches!(
            orch.get_attr(&info.id, "ip").await,
            Err(BackendError::Rejected(_))
        ));

        // Pausing twice is refused.
        assert!(orch
            .set_attr(&info.id, "action", AttrValue::Action(nfio_types::Action::Pause))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_lost_reply_still_applies() {
        let orch = MemoryOrchestrator::new();
        orch.lose_next_reply(Op::Instantiate);
        assert_eq!(
            orch.instantiate("firewall", "fw1").await.unwrap_err(),
            BackendError::Timeout
        );
        assert_eq!(orch.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_unordered_listing() {
        let orch = MemoryOrchestrator::new();
        orch.instantiate("firewall", "a").await.unwrap();
        orch.instantiate("firewall", "b").await.unwrap();
        orch.set_unordered(true);

        let listing = orch.list_instances("firewall").await.unwrap();
        assert!(!listing.ordered);
        let names: Vec<_> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
