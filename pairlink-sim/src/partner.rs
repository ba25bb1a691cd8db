//! Fabricated partner identities for simulated matches.

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fabricated chat partner. Never persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedPartner {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_ref: String,
}

/// Fixed pool the engine rotates partners from.
///
/// Deliberately small and static; the goal is a believable stand-in,
/// not a roster.
#[derive(Debug, Clone)]
pub struct PartnerPool {
    entries: &'static [(&'static str, &'static str)],
}

const DEFAULT_POOL: &[(&str, &str)] = &[
    ("Maya", "avatars/maya.png"),
    ("Jonas", "avatars/jonas.png"),
    ("Priya", "avatars/priya.png"),
    ("Leo", "avatars/leo.png"),
    ("Sofia", "avatars/sofia.png"),
    ("Kenji", "avatars/kenji.png"),
];

impl Default for PartnerPool {
    fn default() -> Self {
        Self {
            entries: DEFAULT_POOL,
        }
    }
}

impl PartnerPool {
    /// Number of identities in the pool.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fabricates a partner from a random pool entry.
    ///
    /// The identity fields rotate deterministically under a seeded RNG;
    /// the id is fresh per assignment so consecutive matches with the
    /// same display name still look like distinct people.
    pub fn assign(&self, rng: &mut impl Rng) -> SimulatedPartner {
        let (display_name, avatar_ref) = self.entries[rng.random_range(0..self.entries.len())];
        SimulatedPartner {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            avatar_ref: avatar_ref.to_string(),
        }
    }
}
