//! Elimination bracket: a balanced binary tree of matches
//!
//! Leaves hold the seeded players; an internal node receives the winner of
//! its children's match. Nodes live in an arena `Vec` and reference each
//! other by index, so the tree shape is immutable after generation and only
//! the `player` fields populate bottom-up.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::session::Player;

pub type NodeId = usize;

#[derive(Debug, thiserror::Error)]
pub enum BracketError {
    #[error("Bracket has already been generated")]
    AlreadyGenerated,

    #[error("Not enough players to generate a bracket")]
    NotEnoughPlayers,

    #[error("Number of players must be a power of 2")]
    NotPowerOfTwo,

    #[error("This match has already been decided")]
    AlreadyDecided,

    #[error("Node is missing a contestant")]
    MissingContestant,
}

/// Which contestant of a match won: A is the left child, B the right
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

pub struct MatchNode {
    pub player: Option<Arc<Player>>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
}

#[derive(Default)]
pub struct Bracket {
    nodes: Vec<MatchNode>,
    root: Option<NodeId>,
}

impl Bracket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_generated(&self) -> bool {
        self.root.is_some()
    }

    /// Seed the bracket from the final roster. Humans are shuffled; bots
    /// stay in roster order at the end of the sequence, which determinist-
    /// ically pushes them into the bye-heavy side of the draw.
    pub fn generate<R: Rng>(
        &mut self,
        players: &[Arc<Player>],
        rng: &mut R,
    ) -> Result<(), BracketError> {
        if self.root.is_some() {
            return Err(BracketError::AlreadyGenerated);
        }
        if players.len() < 4 {
            return Err(BracketError::NotEnoughPlayers);
        }
        if !players.len().is_power_of_two() {
            return Err(BracketError::NotPowerOfTwo);
        }

        let mut humans: Vec<Arc<Player>> = players
            .iter()
            .filter(|p| !p.is_bot)
            .cloned()
            .collect();
        humans.shuffle(rng);

        let bots = players.iter().filter(|p| p.is_bot).cloned();
        let seeded: Vec<Arc<Player>> = humans.into_iter().chain(bots).collect();

        let root = self.build(&seeded);
        self.root = Some(root);
        Ok(())
    }

    /// Split the sequence at the midpoint and recurse; a single player
    /// becomes a leaf
    fn build(&mut self, players: &[Arc<Player>]) -> NodeId {
        if let [player] = players {
            self.nodes.push(MatchNode {
                player: Some(player.clone()),
                left: None,
                right: None,
            });
            return self.nodes.len() - 1;
        }

        let mid = players.len() / 2;
        let left = self.build(&players[..mid]);
        let right = self.build(&players[mid..]);
        self.nodes.push(MatchNode {
            player: None,
            left: Some(left),
            right: Some(right),
        });
        self.nodes.len() - 1
    }

    /// Both contestants of an undecided node, once its children are decided
    pub fn contestants(&self, id: NodeId) -> Option<(Arc<Player>, Arc<Player>)> {
        let node = self.nodes.get(id)?;
        let left = self.nodes.get(node.left?)?.player.clone()?;
        let right = self.nodes.get(node.right?)?.player.clone()?;
        Some((left, right))
    }

    /// The playable matches of the opening round: nodes whose children are
    /// both leaves with players
    pub fn first_round(&self) -> Vec<NodeId> {
        let Some(root) = self.root else {
            return Vec::new();
        };

        let mut queue = VecDeque::from([root]);
        let mut matches = Vec::new();
        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id];
            if let (Some(left), Some(right)) = (node.left, node.right) {
                if self.nodes[left].player.is_some() && self.nodes[right].player.is_some() {
                    matches.push(id);
                } else {
                    queue.push_back(left);
                    queue.push_back(right);
                }
            }
        }
        matches
    }

    /// The distinct parents of the round that was just played
    pub fn next_round(&self, previous: &[NodeId]) -> Vec<NodeId> {
        let mut next = Vec::new();
        for &id in previous {
            if let Some(parent) = self.find_parent(id) {
                if !next.contains(&parent) {
                    next.push(parent);
                }
            }
        }
        next
    }

    fn find_parent(&self, child: NodeId) -> Option<NodeId> {
        self.find_parent_from(self.root?, child)
    }

    // Plain recursive search; the tree never exceeds 5 levels
    fn find_parent_from(&self, current: NodeId, child: NodeId) -> Option<NodeId> {
        let node = &self.nodes[current];
        let (left, right) = (node.left?, node.right?);
        if left == child || right == child {
            return Some(current);
        }
        self.find_parent_from(left, child)
            .or_else(|| self.find_parent_from(right, child))
    }

    /// Promote the winning child's player into the node
    pub fn record_winner(&mut self, id: NodeId, winner: Slot) -> Result<(), BracketError> {
        let node = self.nodes.get(id).ok_or(BracketError::MissingContestant)?;
        if node.player.is_some() {
            return Err(BracketError::AlreadyDecided);
        }
        let child = match winner {
            Slot::A => node.left,
            Slot::B => node.right,
        }
        .ok_or(BracketError::MissingContestant)?;
        let promoted = self.nodes[child]
            .player
            .clone()
            .ok_or(BracketError::MissingContestant)?;

        self.nodes[id].player = Some(promoted);
        Ok(())
    }

    /// The tournament champion, once the final has been decided
    pub fn winner(&self) -> Option<Arc<Player>> {
        self.nodes.get(self.root?)?.player.clone()
    }

    /// Leaf players from the left edge of the draw to the right
    pub fn leaves(&self) -> Vec<Arc<Player>> {
        let mut leaves = Vec::new();
        if let Some(root) = self.root {
            self.collect_leaves(root, &mut leaves);
        }
        leaves
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<Arc<Player>>) {
        let node = &self.nodes[id];
        match (node.left, node.right) {
            (Some(left), Some(right)) => {
                self.collect_leaves(left, out);
                self.collect_leaves(right, out);
            }
            _ => {
                if let Some(player) = &node.player {
                    out.push(player.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn human(name: &str) -> Arc<Player> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(Player::new_human(Uuid::new_v4(), name.into(), tx))
    }

    fn bot(name: &str) -> Arc<Player> {
        Arc::new(Player::new_bot(name.into(), String::new()))
    }

    fn roster(humans: usize, bots: usize) -> Vec<Arc<Player>> {
        let mut players = Vec::new();
        for i in 0..humans {
            players.push(human(&format!("player-{i}")));
        }
        for i in 0..bots {
            players.push(bot(&format!("Bot {}", i + 1)));
        }
        players
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn generation_requires_a_power_of_two_of_at_least_four() {
        let mut bracket = Bracket::new();
        assert!(matches!(
            bracket.generate(&roster(3, 0), &mut rng()),
            Err(BracketError::NotEnoughPlayers)
        ));
        assert!(matches!(
            bracket.generate(&roster(6, 0), &mut rng()),
            Err(BracketError::NotPowerOfTwo)
        ));
        assert!(bracket.generate(&roster(4, 0), &mut rng()).is_ok());
    }

    #[test]
    fn second_generation_always_fails() {
        let mut bracket = Bracket::new();
        bracket.generate(&roster(4, 0), &mut rng()).unwrap();
        assert!(matches!(
            bracket.generate(&roster(4, 0), &mut rng()),
            Err(BracketError::AlreadyGenerated)
        ));
    }

    #[test]
    fn bots_seed_after_humans_in_roster_order() {
        let mut bracket = Bracket::new();
        let players = roster(3, 5);
        bracket.generate(&players, &mut rng()).unwrap();

        let leaves = bracket.leaves();
        assert_eq!(leaves.len(), 8);
        assert!(leaves[..3].iter().all(|p| !p.is_bot));
        assert!(leaves[3..].iter().all(|p| p.is_bot));
        // Bots are not shuffled
        let bot_names: Vec<String> = leaves[3..].iter().map(|p| p.name()).collect();
        assert_eq!(bot_names, ["Bot 1", "Bot 2", "Bot 3", "Bot 4", "Bot 5"]);
    }

    #[test]
    fn rounds_advance_through_a_four_player_draw() {
        let mut bracket = Bracket::new();
        bracket.generate(&roster(4, 0), &mut rng()).unwrap();

        let first = bracket.first_round();
        assert_eq!(first.len(), 2);
        for &id in &first {
            assert!(bracket.contestants(id).is_some());
            bracket.record_winner(id, Slot::A).unwrap();
        }

        let second = bracket.next_round(&first);
        assert_eq!(second.len(), 1);
        assert!(bracket.contestants(second[0]).is_some());
        bracket.record_winner(second[0], Slot::B).unwrap();

        assert!(bracket.next_round(&second).is_empty());
        assert!(bracket.winner().is_some());
    }

    #[test]
    fn a_decided_match_cannot_be_decided_again() {
        let mut bracket = Bracket::new();
        bracket.generate(&roster(4, 0), &mut rng()).unwrap();

        let first = bracket.first_round();
        bracket.record_winner(first[0], Slot::A).unwrap();
        assert!(matches!(
            bracket.record_winner(first[0], Slot::B),
            Err(BracketError::AlreadyDecided)
        ));
    }

    #[test]
    fn contestants_appear_only_once_children_are_decided() {
        let mut bracket = Bracket::new();
        bracket.generate(&roster(8, 0), &mut rng()).unwrap();

        let first = bracket.first_round();
        assert_eq!(first.len(), 4);
        let semis = bracket.next_round(&first);
        assert_eq!(semis.len(), 2);
        // Semi-final contestants are unknown until the openers resolve
        assert!(bracket.contestants(semis[0]).is_none());

        bracket.record_winner(first[0], Slot::A).unwrap();
        bracket.record_winner(first[1], Slot::A).unwrap();
        assert!(bracket.contestants(semis[0]).is_some());
    }
}
