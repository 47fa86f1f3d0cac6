//! Schedules as an arena of nodes
//!
//! A schedule is a tree of firings and repeated sequences stored in a flat
//! arena. The whole tree shares a single version counter: any mutation, at
//! any depth, bumps it, and cursors created before the mutation refuse to
//! continue.

use crate::error::KernelError;
use crate::network::ActorId;

/// Index of a node in a [`Schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One actor fired `iterations` times in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub actor: ActorId,
    pub iterations: usize,
}

impl Firing {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            iterations: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ScheduleNode {
    Firing(Firing),
    Sequence {
        iterations: usize,
        children: Vec<NodeId>,
    },
}

#[derive(Debug, Clone)]
struct Frame {
    node: NodeId,
    child: usize,
    remaining: usize,
}

/// Traversal position over the firings of a [`Schedule`]
#[derive(Debug, Clone)]
pub struct FiringCursor {
    version: u64,
    stack: Vec<Frame>,
}

/// Ordered firings, possibly grouped into repeated sequences
#[derive(Debug, Clone)]
pub struct Schedule {
    nodes: Vec<ScheduleNode>,
    version: u64,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    const ROOT: NodeId = NodeId(0);

    /// An empty schedule whose root sequence runs once
    pub fn new() -> Self {
        Self {
            nodes: vec![ScheduleNode::Sequence {
                iterations: 1,
                children: Vec::new(),
            }],
            version: 0,
        }
    }

    /// A flat schedule firing each actor once, in order
    pub fn from_order(order: impl IntoIterator<Item = ActorId>) -> Self {
        let mut schedule = Self::new();
        for actor in order {
            schedule.push_firing(None, Firing::new(actor));
        }
        schedule
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn attach(&mut self, parent: Option<NodeId>, node: ScheduleNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        let parent = parent.unwrap_or(Self::ROOT);
        if let Some(ScheduleNode::Sequence { children, .. }) = self.nodes.get_mut(parent.0) {
            children.push(id);
        }
        self.version += 1;
        id
    }

    /// Append a firing to `parent` (the root when `None`)
    pub fn push_firing(&mut self, parent: Option<NodeId>, firing: Firing) -> NodeId {
        self.attach(parent, ScheduleNode::Firing(firing))
    }

    /// Append a nested sequence repeated `iterations` times
    pub fn push_sequence(&mut self, parent: Option<NodeId>, iterations: usize) -> NodeId {
        self.attach(
            parent,
            ScheduleNode::Sequence {
                iterations,
                children: Vec::new(),
            },
        )
    }

    /// Change the repetition count of a firing or sequence
    pub fn set_iterations(&mut self, node: NodeId, count: usize) {
        match self.nodes.get_mut(node.0) {
            Some(ScheduleNode::Firing(firing)) => firing.iterations = count,
            Some(ScheduleNode::Sequence { iterations, .. }) => *iterations = count,
            None => return,
        }
        self.version += 1;
    }

    /// Start a traversal at the current version
    pub fn cursor(&self) -> FiringCursor {
        let remaining = match &self.nodes[Self::ROOT.0] {
            ScheduleNode::Sequence { iterations, .. } => *iterations,
            ScheduleNode::Firing(_) => 1,
        };
        let stack = if remaining == 0 {
            Vec::new()
        } else {
            vec![Frame {
                node: Self::ROOT,
                child: 0,
                remaining,
            }]
        };
        FiringCursor {
            version: self.version,
            stack,
        }
    }

    /// Next firing of the traversal, `None` at the end.
    ///
    /// Fails if the schedule was modified after the cursor was created.
    pub fn next_firing(&self, cursor: &mut FiringCursor) -> Result<Option<Firing>, KernelError> {
        if cursor.version != self.version {
            return Err(KernelError::ConcurrentModification {
                expected: cursor.version,
                found: self.version,
            });
        }

        loop {
            let Some(frame) = cursor.stack.last_mut() else {
                return Ok(None);
            };
            let ScheduleNode::Sequence { children, .. } = &self.nodes[frame.node.0] else {
                cursor.stack.pop();
                continue;
            };

            if let Some(&child) = children.get(frame.child) {
                frame.child += 1;
                match &self.nodes[child.0] {
                    ScheduleNode::Firing(firing) if firing.iterations > 0 => {
                        return Ok(Some(*firing))
                    }
                    ScheduleNode::Firing(_) => {}
                    ScheduleNode::Sequence { iterations, .. } => {
                        if *iterations > 0 {
                            cursor.stack.push(Frame {
                                node: child,
                                child: 0,
                                remaining: *iterations,
                            });
                        }
                    }
                }
            } else {
                frame.remaining -= 1;
                if frame.remaining == 0 {
                    cursor.stack.pop();
                } else {
                    frame.child = 0;
                }
            }
        }
    }

    /// All firings in traversal order, with sequences unrolled
    pub fn firings(&self) -> Vec<Firing> {
        let mut cursor = self.cursor();
        let mut firings = Vec::new();
        while let Ok(Some(firing)) = self.next_firing(&mut cursor) {
            firings.push(firing);
        }
        firings
    }

    /// Distinct actors in order of first firing
    pub fn actors(&self) -> Vec<ActorId> {
        let mut actors: Vec<ActorId> = Vec::new();
        for firing in self.firings() {
            if !actors.contains(&firing.actor) {
                actors.push(firing.actor);
            }
        }
        actors
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<ActorId> {
        let mut map: SlotMap<ActorId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_flat_order() {
        let a = ids(3);
        let schedule = Schedule::from_order(a.clone());
        let order: Vec<ActorId> = schedule.firings().iter().map(|f| f.actor).collect();
        assert_eq!(order, a);
        assert_eq!(schedule.actors(), a);
    }

    #[test]
    fn test_nested_sequence_unrolls() {
        let a = ids(3);
        let mut schedule = Schedule::new();
        schedule.push_firing(None, Firing::new(a[0]));
        let inner = schedule.push_sequence(None, 2);
        schedule.push_firing(Some(inner), Firing::new(a[1]));
        schedule.push_firing(Some(inner), Firing { actor: a[2], iterations: 3 });

        let order: Vec<ActorId> = schedule.firings().iter().map(|f| f.actor).collect();
        assert_eq!(order, vec![a[0], a[1], a[2], a[1], a[2]]);
        assert_eq!(schedule.firings()[2].iterations, 3);
        assert_eq!(schedule.actors(), a);
    }

    #[test]
    fn test_mutation_invalidates_cursor() {
        let a = ids(2);
        let mut schedule = Schedule::from_order(a.clone());
        let mut cursor = schedule.cursor();
        assert_eq!(schedule.next_firing(&mut cursor).unwrap().unwrap().actor, a[0]);

        let inner = schedule.push_sequence(None, 1);
        schedule.push_firing(Some(inner), Firing::new(a[1]));
        assert!(matches!(
            schedule.next_firing(&mut cursor),
            Err(KernelError::ConcurrentModification { .. })
        ));
    }

    #[test]
    fn test_deep_mutation_bumps_single_version() {
        let a = ids(1);
        let mut schedule = Schedule::new();
        let outer = schedule.push_sequence(None, 1);
        let inner = schedule.push_sequence(Some(outer), 1);
        let firing = schedule.push_firing(Some(inner), Firing::new(a[0]));
        let before = schedule.version();
        schedule.set_iterations(firing, 4);
        assert_eq!(schedule.version(), before + 1);
    }
}
