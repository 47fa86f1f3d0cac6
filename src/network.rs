//! Actor networks
//!
//! A [`Network`] owns its actors in an arena and records the connections
//! between their ports. Every structural mutation bumps a version counter;
//! schedules and other derived data are cached against that counter.
//! Receivers are rebuilt from the connections by [`Network::prepare`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use slotmap::{new_key_type, SlotMap};

use crate::actor::{Actor, ActorContext, AsAny, StepInfo};
use crate::error::KernelError;
use crate::receiver::{Receiver, ReceiverId, ReceiverTable, SignalStatus};
use crate::time::SuperdenseClock;
use crate::token::Token;

new_key_type! {
    /// Handle of an actor inside a [`Network`]
    pub struct ActorId;
}

/// An input or output port of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub actor: ActorId,
    pub port: usize,
}

/// A connection from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub source: PortRef,
    pub target: PortRef,
}

/// Shared lock guarding the structure of a network
///
/// Holds the published structural version. A running director keeps a read
/// guard for the duration of an iteration; read-only inspectors on other
/// threads may take read access at any time.
#[derive(Debug, Clone, Default)]
pub struct StructureLock {
    inner: Arc<RwLock<u64>>,
}

impl StructureLock {
    pub fn read(&self) -> RwLockReadGuard<'_, u64> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, u64> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last structural version published by the owning network
    pub fn version(&self) -> u64 {
        *self.read()
    }

    fn publish(&self, version: u64) {
        *self.write() = version;
    }
}

/// Receivers wired to the ports of one actor
#[derive(Debug, Clone, Default)]
pub struct ActorPorts {
    pub(crate) inputs: Vec<ReceiverId>,
    pub(crate) outputs: Vec<Vec<ReceiverId>>,
    pub(crate) input_names: Vec<String>,
    pub(crate) output_names: Vec<String>,
}

struct ActorEntry {
    name: String,
    actor: Box<dyn Actor>,
    ports: ActorPorts,
}

/// A graph of actors connected through their ports
#[derive(Default)]
pub struct Network {
    actors: SlotMap<ActorId, ActorEntry>,
    order: Vec<ActorId>,
    connections: Vec<Connection>,
    exposed_inputs: Vec<Vec<PortRef>>,
    exposed_outputs: Vec<PortRef>,
    external: Vec<Vec<ReceiverId>>,
    taps: Vec<ReceiverId>,
    receivers: ReceiverTable,
    version: u64,
    built_version: Option<u64>,
    lock: StructureLock,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .order
            .iter()
            .filter_map(|&id| self.name(id))
            .collect();
        f.debug_struct("Network")
            .field("actors", &names)
            .field("connections", &self.connections.len())
            .field("version", &self.version)
            .finish()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) {
        self.version += 1;
        self.lock.publish(self.version);
    }

    /// Structural version, incremented on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Handle to the structure lock for read-only inspectors
    pub fn structure_lock(&self) -> StructureLock {
        self.lock.clone()
    }

    /// Add an actor under `name`
    pub fn add_actor(&mut self, name: impl Into<String>, actor: impl Actor) -> ActorId {
        self.add_boxed(name, Box::new(actor))
    }

    pub fn add_boxed(&mut self, name: impl Into<String>, actor: Box<dyn Actor>) -> ActorId {
        let id = self.actors.insert(ActorEntry {
            name: name.into(),
            actor,
            ports: ActorPorts::default(),
        });
        self.order.push(id);
        self.bump();
        id
    }

    /// Remove an actor with all its connections
    pub fn remove_actor(&mut self, id: ActorId) -> Option<Box<dyn Actor>> {
        let entry = self.actors.remove(id)?;
        self.order.retain(|&a| a != id);
        self.connections
            .retain(|c| c.source.actor != id && c.target.actor != id);
        for group in &mut self.exposed_inputs {
            group.retain(|p| p.actor != id);
        }
        self.exposed_outputs.retain(|p| p.actor != id);
        self.bump();
        Some(entry.actor)
    }

    fn entry(&self, id: ActorId) -> Result<&ActorEntry, KernelError> {
        self.actors
            .get(id)
            .ok_or_else(|| KernelError::UnknownActor(format!("{id:?}")))
    }

    fn check_port(&self, id: ActorId, port: usize, input: bool) -> Result<(), KernelError> {
        let entry = self.entry(id)?;
        let (count, direction) = if input {
            (entry.actor.num_inputs(), "input")
        } else {
            (entry.actor.num_outputs(), "output")
        };
        if port < count {
            Ok(())
        } else {
            Err(KernelError::PortOutOfRange {
                actor: entry.name.clone(),
                direction,
                port,
            })
        }
    }

    fn is_driven(&self, target: PortRef) -> bool {
        self.connections.iter().any(|c| c.target == target)
            || self.exposed_inputs.iter().flatten().any(|p| *p == target)
    }

    fn check_undriven(&self, target: PortRef) -> Result<(), KernelError> {
        if self.is_driven(target) {
            let entry = self.entry(target.actor)?;
            return Err(KernelError::PortAlreadyConnected {
                actor: entry.name.clone(),
                port: entry.actor.input_name(target.port),
            });
        }
        Ok(())
    }

    /// Connect output `output` of `source` to input `input` of `target`.
    ///
    /// An input accepts a single source; an output may fan out.
    pub fn connect(
        &mut self,
        source: ActorId,
        output: usize,
        target: ActorId,
        input: usize,
    ) -> Result<(), KernelError> {
        self.check_port(source, output, false)?;
        self.check_port(target, input, true)?;
        let target_ref = PortRef {
            actor: target,
            port: input,
        };
        self.check_undriven(target_ref)?;
        self.connections.push(Connection {
            source: PortRef {
                actor: source,
                port: output,
            },
            target: target_ref,
        });
        self.bump();
        Ok(())
    }

    /// Remove a connection, returns false if it did not exist
    pub fn disconnect(
        &mut self,
        source: ActorId,
        output: usize,
        target: ActorId,
        input: usize,
    ) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| {
            !(c.source.actor == source
                && c.source.port == output
                && c.target.actor == target
                && c.target.port == input)
        });
        let removed = self.connections.len() != before;
        if removed {
            self.bump();
        }
        removed
    }

    /// Drive the given inputs from outside the network; returns the index of
    /// the new external input
    pub fn expose_input(&mut self, targets: &[(ActorId, usize)]) -> Result<usize, KernelError> {
        let mut group = Vec::with_capacity(targets.len());
        for &(actor, port) in targets {
            self.check_port(actor, port, true)?;
            let target = PortRef { actor, port };
            self.check_undriven(target)?;
            group.push(target);
        }
        self.exposed_inputs.push(group);
        self.bump();
        Ok(self.exposed_inputs.len() - 1)
    }

    /// Make an output readable from outside the network; returns the index
    /// of the new external output
    pub fn expose_output(&mut self, actor: ActorId, port: usize) -> Result<usize, KernelError> {
        self.check_port(actor, port, false)?;
        self.exposed_outputs.push(PortRef { actor, port });
        self.bump();
        Ok(self.exposed_outputs.len() - 1)
    }

    pub fn num_exposed_inputs(&self) -> usize {
        self.exposed_inputs.len()
    }

    pub fn num_exposed_outputs(&self) -> usize {
        self.exposed_outputs.len()
    }

    pub fn exposed_inputs(&self) -> &[Vec<PortRef>] {
        &self.exposed_inputs
    }

    pub fn exposed_outputs(&self) -> &[PortRef] {
        &self.exposed_outputs
    }

    /// Actors in insertion order
    pub fn actor_ids(&self) -> &[ActorId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn name(&self, id: ActorId) -> Option<&str> {
        self.actors.get(id).map(|e| e.name.as_str())
    }

    pub fn id_of(&self, name: &str) -> Option<ActorId> {
        self.order
            .iter()
            .copied()
            .find(|&id| self.name(id) == Some(name))
    }

    pub fn actor(&self, id: ActorId) -> Option<&dyn Actor> {
        self.actors.get(id).map(|e| e.actor.as_ref())
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut dyn Actor> {
        self.actors.get_mut(id).map(|e| e.actor.as_mut())
    }

    /// Downcast an actor to its concrete type
    pub fn actor_as<T: Actor>(&self, id: ActorId) -> Option<&T> {
        let actor: &dyn Actor = self.actors.get(id)?.actor.as_ref();
        AsAny::as_any(actor).downcast_ref::<T>()
    }

    pub fn actor_as_mut<T: Actor>(&mut self, id: ActorId) -> Option<&mut T> {
        let actor: &mut dyn Actor = self.actors.get_mut(id)?.actor.as_mut();
        AsAny::as_any_mut(actor).downcast_mut::<T>()
    }

    /// Whether every actor's `fire` is a pure function of its inputs
    pub fn all_fire_functional(&self) -> bool {
        self.actors.values().all(|e| e.actor.is_fire_functional())
    }

    /// Rebuild receivers if the structure changed since the last call
    pub fn prepare(&mut self) {
        if self.built_version == Some(self.version) {
            return;
        }

        let mut receivers = ReceiverTable::new();
        let mut inputs: Vec<(ActorId, Vec<Option<ReceiverId>>)> = Vec::new();

        for &id in &self.order {
            let entry = &mut self.actors[id];
            let n_in = entry.actor.num_inputs();
            let n_out = entry.actor.num_outputs();
            entry.ports = ActorPorts {
                inputs: Vec::with_capacity(n_in),
                outputs: vec![Vec::new(); n_out],
                input_names: (0..n_in).map(|p| entry.actor.input_name(p)).collect(),
                output_names: (0..n_out).map(|p| entry.actor.output_name(p)).collect(),
            };
            inputs.push((id, vec![None; n_in]));
        }

        for c in &self.connections {
            let rid = receivers.push(Receiver::new());
            if let Some((_, ports)) = inputs.iter_mut().find(|(id, _)| *id == c.target.actor) {
                ports[c.target.port] = Some(rid);
            }
            self.actors[c.source.actor].ports.outputs[c.source.port].push(rid);
        }

        self.external = Vec::with_capacity(self.exposed_inputs.len());
        for group in &self.exposed_inputs {
            let mut ids = Vec::with_capacity(group.len());
            for target in group {
                let rid = receivers.push(Receiver::new());
                if let Some((_, ports)) = inputs.iter_mut().find(|(id, _)| *id == target.actor) {
                    ports[target.port] = Some(rid);
                }
                ids.push(rid);
            }
            self.external.push(ids);
        }

        self.taps = Vec::with_capacity(self.exposed_outputs.len());
        for source in &self.exposed_outputs {
            let rid = receivers.push(Receiver::new());
            self.actors[source.actor].ports.outputs[source.port].push(rid);
            self.taps.push(rid);
        }

        for (id, ports) in inputs {
            let resolved = ports
                .into_iter()
                .map(|slot| slot.unwrap_or_else(|| receivers.push(Receiver::sourceless())))
                .collect();
            self.actors[id].ports.inputs = resolved;
        }

        self.receivers = receivers;
        self.built_version = Some(self.version);
    }

    pub fn receivers(&self) -> &ReceiverTable {
        &self.receivers
    }

    /// Reset every receiver to unknown
    pub fn reset_receivers(&mut self) {
        self.receivers.reset_all();
    }

    pub fn all_inputs_known(&self, id: ActorId) -> Result<bool, KernelError> {
        Ok(self.first_unknown_input(id)?.is_none())
    }

    /// Index of the first input of `id` whose status is unknown
    pub fn first_unknown_input(&self, id: ActorId) -> Result<Option<usize>, KernelError> {
        let entry = self.entry(id)?;
        Ok(entry
            .ports
            .inputs
            .iter()
            .position(|&rid| !self.receivers.get(rid).is_known()))
    }

    /// Name of input `port` of `id`
    pub fn input_name(&self, id: ActorId, port: usize) -> Option<String> {
        let entry = self.actors.get(id)?;
        (port < entry.actor.num_inputs()).then(|| entry.actor.input_name(port))
    }

    /// Force every unknown output of `id` to absent
    pub fn clear_unknown_outputs(&mut self, id: ActorId) -> Result<(), KernelError> {
        let entry = self
            .actors
            .get(id)
            .ok_or_else(|| KernelError::UnknownActor(format!("{id:?}")))?;
        for &rid in entry.ports.outputs.iter().flatten() {
            if !self.receivers.get(rid).is_known() {
                self.receivers.clear(rid).map_err(|e| KernelError::Monotonicity {
                    actor: entry.name.clone(),
                    detail: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Status of input `port` of `id` in the current iteration
    pub fn input_status(&self, id: ActorId, port: usize) -> Option<SignalStatus> {
        let rid = *self.actors.get(id)?.ports.inputs.get(port)?;
        Some(self.receivers.get(rid).status())
    }

    /// Token on input `port` of `id`, if known and present
    pub fn input_token(&self, id: ActorId, port: usize) -> Option<Token> {
        let rid = *self.actors.get(id)?.ports.inputs.get(port)?;
        self.receivers.get(rid).get().ok().flatten().cloned()
    }

    /// Whether external input `index` is known
    pub(crate) fn is_external_known(&self, index: usize) -> bool {
        self.external
            .get(index)
            .map_or(true, |ids| ids.iter().all(|&rid| self.receivers.get(rid).is_known()))
    }

    /// Drive external input `index`; absent when `token` is `None`
    pub(crate) fn drive_external(
        &mut self,
        index: usize,
        token: Option<&Token>,
    ) -> Result<(), crate::error::ReceiverError> {
        let Some(ids) = self.external.get(index) else {
            return Ok(());
        };
        for &rid in ids {
            match token {
                Some(token) => self.receivers.put(rid, token.clone())?,
                None => self.receivers.clear(rid)?,
            }
        }
        Ok(())
    }

    /// Receiver behind external output `index`
    pub(crate) fn tap(&self, index: usize) -> Option<&Receiver> {
        self.taps.get(index).map(|&rid| self.receivers.get(rid))
    }

    /// Invoke `f` on actor `id` with a context bound to this network
    pub(crate) fn invoke<R>(
        &mut self,
        id: ActorId,
        clock: &mut SuperdenseClock,
        step: Option<StepInfo<'_>>,
        f: impl FnOnce(&mut dyn Actor, &mut ActorContext<'_>) -> Result<R, KernelError>,
    ) -> Result<R, KernelError> {
        let entry = self
            .actors
            .get_mut(id)
            .ok_or_else(|| KernelError::UnknownActor(format!("{id:?}")))?;
        let ActorEntry { name, actor, ports } = entry;
        let mut ctx = ActorContext {
            name: name.as_str(),
            ports: &*ports,
            receivers: &mut self.receivers,
            clock,
            step,
        };
        f(&mut **actor, &mut ctx)
    }

    /// Call `wrapup` on every actor
    pub fn wrapup(&mut self) {
        for entry in self.actors.values_mut() {
            entry.actor.wrapup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Add, Const, Recorder, Scale};

    #[test]
    fn test_connect_validates_ports() {
        let mut net = Network::new();
        let src = net.add_actor("src", Const::new(1.0));
        let gain = net.add_actor("gain", Scale::new(2.0));

        assert!(matches!(
            net.connect(src, 1, gain, 0),
            Err(KernelError::PortOutOfRange { direction: "output", .. })
        ));
        assert!(matches!(
            net.connect(src, 0, gain, 3),
            Err(KernelError::PortOutOfRange { direction: "input", .. })
        ));
        net.connect(src, 0, gain, 0).unwrap();
        assert!(matches!(
            net.connect(src, 0, gain, 0),
            Err(KernelError::PortAlreadyConnected { .. })
        ));
    }

    #[test]
    fn test_every_mutation_bumps_version() {
        let mut net = Network::new();
        let lock = net.structure_lock();
        let v0 = net.version();
        let src = net.add_actor("src", Const::new(1.0));
        let rec = net.add_actor("rec", Recorder::new());
        net.connect(src, 0, rec, 0).unwrap();
        let v1 = net.version();
        assert_eq!(v1, v0 + 3);
        assert_eq!(lock.version(), v1);

        assert!(net.disconnect(src, 0, rec, 0));
        assert!(!net.disconnect(src, 0, rec, 0));
        assert_eq!(net.version(), v1 + 1);

        net.remove_actor(src);
        assert_eq!(net.len(), 1);
        assert_eq!(lock.version(), v1 + 2);
    }

    #[test]
    fn test_unconnected_inputs_are_known_absent() {
        let mut net = Network::new();
        let add = net.add_actor("add", Add::new(2));
        let src = net.add_actor("src", Const::new(1.0));
        net.connect(src, 0, add, 0).unwrap();
        net.prepare();

        assert_eq!(net.input_status(add, 0), Some(SignalStatus::Unknown));
        assert_eq!(net.input_status(add, 1), Some(SignalStatus::Absent));
        assert_eq!(net.first_unknown_input(add).unwrap(), Some(0));
    }

    #[test]
    fn test_fan_out_reaches_every_target() {
        let mut net = Network::new();
        let src = net.add_actor("src", Const::new(4.0));
        let a = net.add_actor("a", Recorder::new());
        let b = net.add_actor("b", Recorder::new());
        net.connect(src, 0, a, 0).unwrap();
        net.connect(src, 0, b, 0).unwrap();
        net.prepare();

        let mut clock = SuperdenseClock::new(1e-10);
        net.invoke(src, &mut clock, None, |actor, ctx| actor.fire(ctx))
            .unwrap();
        assert_eq!(net.input_token(a, 0), Some(Token::Double(4.0)));
        assert_eq!(net.input_token(b, 0), Some(Token::Double(4.0)));
        assert!(net.all_inputs_known(a).unwrap());
    }

    #[test]
    fn test_exposed_ports() {
        let mut net = Network::new();
        let gain = net.add_actor("gain", Scale::new(3.0));
        assert_eq!(net.expose_input(&[(gain, 0)]).unwrap(), 0);
        assert_eq!(net.expose_output(gain, 0).unwrap(), 0);
        assert!(net.expose_input(&[(gain, 0)]).is_err());
        net.prepare();

        assert!(!net.is_external_known(0));
        net.drive_external(0, Some(&Token::Double(2.0))).unwrap();
        assert!(net.is_external_known(0));

        let mut clock = SuperdenseClock::new(1e-10);
        net.invoke(gain, &mut clock, None, |actor, ctx| actor.fire(ctx))
            .unwrap();
        let tap = net.tap(0).unwrap();
        assert_eq!(tap.get().unwrap(), Some(&Token::Double(6.0)));
    }

    #[test]
    fn test_lookup_and_downcast() {
        let mut net = Network::new();
        let gain = net.add_actor("gain", Scale::new(3.0));
        assert_eq!(net.id_of("gain"), Some(gain));
        assert_eq!(net.id_of("missing"), None);
        assert_eq!(net.actor_as::<Scale>(gain).map(Scale::gain), Some(3.0));
        assert!(net.actor_as::<Recorder>(gain).is_none());
    }
}
