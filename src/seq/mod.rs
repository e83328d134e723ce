//! # Logoot sequence
//!
//! A Logoot sequence is a CRDT for ordered lists of elements (characters of a text, blocks of a
//! document). Every element, an [`Atom`], carries a [`Position`]: a list of
//! `<digit, site>` identifiers compared lexicographically. Positions are dense: between any two of
//! them a new one can always be generated, extending precision by one digit when the two are
//! adjacent.
//!
//! To insert `d` between `a` and `b` in `[ a, b, c ]`, a site generates a position `z` with
//! `pos(a) < z < pos(b)` and broadcasts the new atom. Every replica then slots the atom in by
//! comparing positions, so replicas that saw the same set of atoms hold the same list no matter
//! the delivery order. The site id inside each identifier keeps positions from different sites
//! apart without coordination.
//!
//! The list is bounded by two sentinel atoms, MIN at position `[<0, 0>]` and MAX at
//! `[<MAX_POS, 0>]`, so every real atom always has a predecessor and a successor.
//!
//! Insertion is idempotent, but ops must be delivered in _causal_ order: an atom's removal must be
//! applied after the atom itself.
//!
//! # Examples
//!
//! ```
//! use logoot::{CmRDT, Sequence, Site};
//!
//! let mut alice = Site::new(1u32).unwrap();
//! let mut bob = Site::new(2u32).unwrap();
//! let (mut a, mut b) = (Sequence::new(), Sequence::new());
//!
//! let op1 = a.insert_index(&mut alice, 0, 'a').unwrap();
//! let op2 = b.insert_index(&mut bob, 0, 'b').unwrap();
//! a.apply(op2.clone()).unwrap();
//! b.apply(op1.clone()).unwrap();
//!
//! assert_eq!(a.values().collect::<String>(), b.values().collect::<String>());
//! ```
//!
//! [1] S. Weiss, P. Urso, and P. Molli,
//! “Logoot: A Scalable Optimistic Replication Algorithm for Collaborative Editing on P2P Networks,”
//! in 2009 29th IEEE International Conference on Distributed Computing Systems,
//! Montreal, Quebec, Canada, Jun. 2009, pp. 404–412, doi: 10.1109/ICDCS.2009.75.

/// Identifiers, positions and position generation
pub mod ident;

use std::cmp::{self, Ordering};
use std::convert::TryFrom;

use quickcheck::{Arbitrary, Gen};
use rand::Rng;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::site::{Counter, Site, SiteId};
use crate::traits::CmRDT;
use ident::{generate_position_with, Position, MAX_POS};

/// Globally unique handle of an atom: its position plus the clock of the site that made it.
///
/// Only the position takes part in ordering, see [`AtomIdent::cmp_position`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtomIdent<S> {
    /// Where the atom sorts
    pub position: Position<S>,
    /// Clock of the creating site at creation time
    pub clock: Counter,
}

impl<S> AtomIdent<S> {
    /// Pair a position with a clock value.
    pub fn new(position: Position<S>, clock: Counter) -> Self {
        AtomIdent { position, clock }
    }
}

impl<S: Ord> AtomIdent<S> {
    /// Order two atom identifiers by position. The clock is never consulted.
    pub fn cmp_position(&self, other: &Self) -> Ordering {
        self.position.cmp(&other.position)
    }
}

impl<S: SiteId> AtomIdent<S> {
    /// Identifier of the MIN sentinel atom
    pub fn min() -> Self {
        AtomIdent::new(Position::min(), 0)
    }

    /// Identifier of the MAX sentinel atom
    pub fn max() -> Self {
        AtomIdent::new(Position::max(), 1)
    }
}

impl<S: Serialize> Serialize for AtomIdent<S> {
    fn serialize<Z: Serializer>(&self, serializer: Z) -> std::result::Result<Z::Ok, Z::Error> {
        (&self.position, self.clock).serialize(serializer)
    }
}

impl<'de, S: Deserialize<'de>> Deserialize<'de> for AtomIdent<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (position, clock) = <(Position<S>, Counter)>::deserialize(deserializer)?;
        Ok(AtomIdent { position, clock })
    }
}

impl<S: Arbitrary + SiteId> Arbitrary for AtomIdent<S> {
    fn arbitrary<G: Gen>(g: &mut G) -> Self {
        AtomIdent::new(Position::arbitrary(g), u64::arbitrary(g) % 50)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let clock = self.clock;
        Box::new(
            self.position
                .shrink()
                .map(move |position| AtomIdent::new(position, clock)),
        )
    }
}

/// Compare two atom identifiers by position.
pub fn compare_atom_identifiers<S: Ord>(a: &AtomIdent<S>, b: &AtomIdent<S>) -> Ordering {
    a.cmp_position(b)
}

/// Generate an atom identifier strictly between `prev` and `next` for `site`, stamped with
/// `clock`. The caller owns the clock.
pub fn generate_atom_identifier<S: SiteId>(
    site: &S,
    clock: Counter,
    prev: &AtomIdent<S>,
    next: &AtomIdent<S>,
) -> Result<AtomIdent<S>> {
    generate_atom_identifier_with(site, clock, prev, next, &mut rand::thread_rng())
}

/// Like [`generate_atom_identifier`] but drawing from the given random source.
pub fn generate_atom_identifier_with<S: SiteId, R: Rng>(
    site: &S,
    clock: Counter,
    prev: &AtomIdent<S>,
    next: &AtomIdent<S>,
    rng: &mut R,
) -> Result<AtomIdent<S>> {
    let position = generate_position_with(site, &prev.position, &next.position, rng)?;
    Ok(AtomIdent::new(position, clock))
}

/// An element of the sequence. Sentinels carry no value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom<S, T> {
    /// The identifier of the atom
    pub id: AtomIdent<S>,
    /// The payload, `None` only for the sentinels
    pub value: Option<T>,
}

impl<S, T> Atom<S, T> {
    /// Build an atom carrying `value`.
    pub fn new(id: AtomIdent<S>, value: T) -> Self {
        Atom {
            id,
            value: Some(value),
        }
    }
}

impl<S: SiteId, T> Atom<S, T> {
    /// The MIN sentinel atom
    pub fn min() -> Self {
        Atom {
            id: AtomIdent::min(),
            value: None,
        }
    }

    /// The MAX sentinel atom
    pub fn max() -> Self {
        Atom {
            id: AtomIdent::max(),
            value: None,
        }
    }
}

impl<S: Serialize, T: Serialize> Serialize for Atom<S, T> {
    fn serialize<Z: Serializer>(&self, serializer: Z) -> std::result::Result<Z::Ok, Z::Error> {
        (&self.id, &self.value).serialize(serializer)
    }
}

impl<'de, S: Deserialize<'de>, T: Deserialize<'de>> Deserialize<'de> for Atom<S, T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (id, value) = <(AtomIdent<S>, Option<T>)>::deserialize(deserializer)?;
        Ok(Atom { id, value })
    }
}

/// Where an atom belongs within a sorted run of atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The atom goes at this index, right before the atom currently there
    Vacant(usize),
    /// An atom with the same position already sits at this index
    Occupied(usize),
}

/// Scan adjacent pairs of `atoms` for the slot of `id`.
///
/// # Errors
///
/// * [`Error::OutOfOrder`] if `id` sorts before a predecessor met during the scan, or after the
///   last atom.
/// * [`Error::ExhaustedScan`] if no pair resolves, which only happens with fewer than two atoms.
pub fn find_slot<S: Ord, T>(atoms: &[Atom<S, T>], id: &AtomIdent<S>) -> Result<Slot> {
    if let Some(last) = atoms.last() {
        if id.cmp_position(&last.id) == Ordering::Greater {
            return Err(Error::OutOfOrder {
                index: atoms.len() - 1,
            });
        }
    }

    for (ix, pair) in atoms.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        match (id.cmp_position(&prev.id), id.cmp_position(&next.id)) {
            (Ordering::Less, _) => return Err(Error::OutOfOrder { index: ix }),
            (Ordering::Equal, _) => return Ok(Slot::Occupied(ix)),
            (_, Ordering::Equal) => return Ok(Slot::Occupied(ix + 1)),
            (Ordering::Greater, Ordering::Less) => return Ok(Slot::Vacant(ix + 1)),
            (Ordering::Greater, Ordering::Greater) => continue,
        }
    }

    Err(Error::ExhaustedScan)
}

/// Insert `atom` into a sorted container, leaving the mutation to `place`.
///
/// `place` receives the container, the index to insert at and the atom, and returns the
/// resulting container. That can be the same container mutated in place, a new persistent copy
/// or a handle to storage. If an atom with the same position is already present the container
/// is returned untouched, whatever its value.
///
/// ```
/// use logoot::{insert_atom, Atom, Site};
///
/// let atoms = vec![Atom::<u32, char>::min(), Atom::max()];
/// let id = Site::new(1).unwrap().alloc(&atoms[0].id, &atoms[1].id).unwrap();
///
/// let atoms = insert_atom(atoms, Atom::new(id, 'x'), |mut atoms, ix, atom| {
///     atoms.insert(ix, atom);
///     atoms
/// })
/// .unwrap();
/// assert_eq!(atoms[1].value, Some('x'));
/// ```
pub fn insert_atom<S, T, C, F>(container: C, atom: Atom<S, T>, place: F) -> Result<C>
where
    S: SiteId,
    C: AsRef<[Atom<S, T>]>,
    F: FnOnce(C, usize, Atom<S, T>) -> C,
{
    match find_slot(container.as_ref(), &atom.id) {
        Ok(Slot::Vacant(ix)) => {
            trace!(ix, position = ?atom.id.position, "placing atom");
            Ok(place(container, ix, atom))
        }
        Ok(Slot::Occupied(ix)) => {
            debug!(ix, "atom already present, insert is a no-op");
            Ok(container)
        }
        Err(err) => {
            warn!(%err, position = ?atom.id.position, "rejecting insert");
            Err(err)
        }
    }
}

/// The local materialized view of the list: atoms sorted by position between the MIN and MAX
/// sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence<S, T> {
    atoms: Vec<Atom<S, T>>,
}

/// Operations that can be exchanged between replicas of a [`Sequence`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Op<S, T> {
    /// Insert an atom
    Insert {
        /// The atom to insert
        atom: Atom<S, T>,
    },
    /// Remove the atom at a position
    Delete {
        /// Identifier of the atom to remove
        id: AtomIdent<S>,
    },
}

impl<S: SiteId, T> Default for Sequence<S, T> {
    fn default() -> Self {
        Sequence::new()
    }
}

impl<S: SiteId, T> Sequence<S, T> {
    /// Create a sequence holding only the two sentinels.
    pub fn new() -> Self {
        Sequence {
            atoms: vec![Atom::min(), Atom::max()],
        }
    }

    /// Number of atoms, sentinels excluded.
    pub fn len(&self) -> usize {
        self.atoms.len() - 2
    }

    /// Check if only the sentinels are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every atom including both sentinels, in order.
    pub fn atoms(&self) -> &[Atom<S, T>] {
        &self.atoms
    }

    /// The MIN sentinel
    pub fn first(&self) -> &Atom<S, T> {
        &self.atoms[0]
    }

    /// The MAX sentinel
    pub fn last(&self) -> &Atom<S, T> {
        &self.atoms[self.atoms.len() - 1]
    }

    /// Atoms between the sentinels, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Atom<S, T>> + '_ {
        self.atoms[1..self.atoms.len() - 1].iter()
    }

    /// Values of the atoms between the sentinels, in order.
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter().filter_map(|atom| atom.value.as_ref())
    }

    /// The atom at index `ix`, sentinels excluded.
    pub fn get(&self, ix: usize) -> Option<&Atom<S, T>> {
        if ix < self.len() {
            self.atoms.get(ix + 1)
        } else {
            None
        }
    }

    /// Index of the atom at `id`'s position, sentinels excluded.
    pub fn position_of(&self, id: &AtomIdent<S>) -> Option<usize> {
        match self.search(id) {
            Ok(i) if i > 0 && i < self.atoms.len() - 1 => Some(i - 1),
            _ => None,
        }
    }

    /// Check if an atom with `id`'s position is present. Sentinels count.
    pub fn contains(&self, id: &AtomIdent<S>) -> bool {
        self.search(id).is_ok()
    }

    /// Identifiers of the atoms an insertion at index `ix` lands between.
    /// An `ix` past the end appends.
    pub fn neighbours(&self, ix: usize) -> (&AtomIdent<S>, &AtomIdent<S>) {
        let ix = cmp::min(ix, self.len());
        (&self.atoms[ix].id, &self.atoms[ix + 1].id)
    }

    /// Insert an atom in place.
    ///
    /// Returns `false` if an atom with the same position was already present, in which case the
    /// sequence is unchanged.
    pub fn insert(&mut self, atom: Atom<S, T>) -> Result<bool> {
        let before = self.atoms.len();
        insert_atom(&mut self.atoms, atom, |atoms, ix, atom| {
            atoms.insert(ix, atom);
            atoms
        })?;
        Ok(self.atoms.len() > before)
    }

    /// Remove the atom at `id`'s position and return it.
    ///
    /// Removing an absent atom is a no-op. The sentinels are never removed.
    pub fn remove(&mut self, id: &AtomIdent<S>) -> Option<Atom<S, T>> {
        match self.position_of(id) {
            Some(ix) => Some(self.atoms.remove(ix + 1)),
            None => {
                debug!(position = ?id.position, "nothing to remove");
                None
            }
        }
    }

    /// Perform a local insertion of `value` at index `ix` on behalf of `site`.
    /// If `ix` is greater than the length of the sequence the value is appended.
    ///
    /// Returns the op to broadcast to the other replicas.
    pub fn insert_index(&mut self, site: &mut Site<S>, ix: usize, value: T) -> Result<Op<S, T>>
    where
        T: Clone,
    {
        let (prev, next) = self.neighbours(ix);
        let id = site.alloc(prev, next)?;
        let atom = Atom::new(id, value);

        self.insert(atom.clone())?;
        Ok(Op::Insert { atom })
    }

    /// Perform a local deletion at index `ix`.
    ///
    /// If `ix` is out of bounds nothing is removed and `None` is returned.
    pub fn delete_index(&mut self, ix: usize) -> Option<Op<S, T>> {
        let id = self.get(ix)?.id.clone();
        self.remove(&id);
        Some(Op::Delete { id })
    }

    fn search(&self, id: &AtomIdent<S>) -> std::result::Result<usize, usize> {
        self.atoms.binary_search_by(|atom| atom.id.cmp_position(id))
    }
}

impl<S: SiteId, T> AsRef<[Atom<S, T>]> for Sequence<S, T> {
    fn as_ref(&self) -> &[Atom<S, T>] {
        &self.atoms
    }
}

impl<S: SiteId, T> TryFrom<Vec<Atom<S, T>>> for Sequence<S, T> {
    type Error = Error;

    /// Adopt a list of atoms, checking the sentinels and the strict order in between.
    fn try_from(atoms: Vec<Atom<S, T>>) -> Result<Self> {
        if atoms.len() < 2 {
            return Err(Error::MalformedSequence("fewer than two atoms"));
        }
        let first = &atoms[0];
        if first.id != AtomIdent::min() || first.value.is_some() {
            return Err(Error::MalformedSequence("first atom is not the MIN sentinel"));
        }
        let last = &atoms[atoms.len() - 1];
        if last.id != AtomIdent::max() || last.value.is_some() {
            return Err(Error::MalformedSequence("last atom is not the MAX sentinel"));
        }
        let interior = &atoms[1..atoms.len() - 1];
        if interior
            .iter()
            .flat_map(|atom| atom.id.position.iter())
            .any(|id| id.n > MAX_POS)
        {
            return Err(Error::MalformedSequence("identifier digit exceeds the maximum"));
        }
        if interior.iter().any(|atom| !atom.id.position.is_open_below()) {
            return Err(Error::MalformedSequence("position ends in the sentinel digit"));
        }
        let sorted = atoms
            .windows(2)
            .all(|pair| pair[0].id.cmp_position(&pair[1].id) == Ordering::Less);
        if !sorted {
            return Err(Error::MalformedSequence("positions are not strictly increasing"));
        }
        Ok(Sequence { atoms })
    }
}

impl<S: SiteId, T> From<Sequence<S, T>> for Vec<Atom<S, T>> {
    fn from(seq: Sequence<S, T>) -> Self {
        seq.atoms
    }
}

impl<S: Serialize, T: Serialize> Serialize for Sequence<S, T> {
    fn serialize<Z: Serializer>(&self, serializer: Z) -> std::result::Result<Z::Ok, Z::Error> {
        self.atoms.serialize(serializer)
    }
}

impl<'de, S: SiteId, T: Deserialize<'de>> Deserialize<'de> for Sequence<S, T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let atoms = Vec::<Atom<S, T>>::deserialize(deserializer)?;
        Sequence::try_from(atoms).map_err(de::Error::custom)
    }
}

impl<S: SiteId, T> CmRDT for Sequence<S, T> {
    type Op = Op<S, T>;

    /// Apply an op to this replica.
    ///
    /// Inserting a position that is already present is a no-op, as is deleting a position that
    /// is absent.
    fn apply(&mut self, op: Self::Op) -> Result<()> {
        match op {
            Op::Insert { atom } => self.insert(atom).map(|_| ()),
            Op::Delete { id } => {
                self.remove(&id);
                Ok(())
            }
        }
    }
}
