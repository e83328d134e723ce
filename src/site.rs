//! Site identity and the per-site logical clock.
//!
//! # Examples
//!
//! ```
//! use logoot::Site;
//! let mut site = Site::new(7u32).unwrap();
//! assert_eq!(site.tick(), 1);
//! assert_eq!(site.tick(), 2);
//! assert_eq!(site.clock(), 2);
//! ```

use std::fmt::Debug;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::seq::{generate_atom_identifier_with, AtomIdent};

/// A counter is the logical clock value a site stamps on the atoms it creates.
pub type Counter = u64;

/// Common site identifier type. Any totally ordered, serializable value works.
///
/// `Self::default()` is the site id carried by the MIN and MAX sentinels and must be the least
/// value of the type (`0` for unsigned integers, `""` for strings). It cannot be used to generate
/// positions.
pub trait SiteId: Ord + Clone + Default + Hash + Debug + Serialize + DeserializeOwned {}
impl<S: Ord + Clone + Default + Hash + Debug + Serialize + DeserializeOwned> SiteId for S {}

/// A replica able to generate new atoms: its id and its current clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct Site<S: SiteId> {
    id: S,
    clock: Counter,
}

impl<S: SiteId> Site<S> {
    /// Build a site with a fresh clock.
    pub fn new(id: S) -> Result<Self> {
        Self::with_clock(id, 0)
    }

    /// Resume a site whose clock was last observed at `clock`.
    pub fn with_clock(id: S, clock: Counter) -> Result<Self> {
        if id == S::default() {
            return Err(Error::ReservedSite);
        }
        Ok(Site { id, clock })
    }

    /// The id of this site
    pub fn id(&self) -> &S {
        &self.id
    }

    /// The last clock value handed out
    pub fn clock(&self) -> Counter {
        self.clock
    }

    /// Advance the clock and return the new value.
    pub fn tick(&mut self) -> Counter {
        self.clock += 1;
        self.clock
    }

    /// Allocate an atom identifier strictly between `prev` and `next`, stamped with the next
    /// clock value.
    ///
    /// The clock is only advanced when allocation succeeds.
    pub fn alloc(&mut self, prev: &AtomIdent<S>, next: &AtomIdent<S>) -> Result<AtomIdent<S>> {
        self.alloc_with(prev, next, &mut rand::thread_rng())
    }

    /// Like [`Site::alloc`] but drawing from the given random source.
    pub fn alloc_with<R: rand::Rng>(
        &mut self,
        prev: &AtomIdent<S>,
        next: &AtomIdent<S>,
        rng: &mut R,
    ) -> Result<AtomIdent<S>> {
        let id = generate_atom_identifier_with(&self.id, self.clock + 1, prev, next, rng)?;
        self.tick();
        Ok(id)
    }
}
