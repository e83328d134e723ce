//! The ordering core of a Logoot sequence CRDT.
//!
//! Independent replicas ("sites") insert elements into a shared ordered sequence without
//! coordination. Each element carries a dense, totally ordered, globally unique position, so all
//! replicas that observed the same insertions hold the same order regardless of delivery order.
//!
//! This crate provides the position algebra (comparison and generation of a position strictly
//! between two others) and an ordered container with idempotent insertion. Transport, causal
//! delivery and persistence are left to the surrounding system.
#![crate_type = "lib"]
#![deny(missing_docs)]

mod error;
pub use crate::error::{Error, Result};

mod traits;
pub use crate::traits::CmRDT;

/// This module contains site identity and the per-site clock.
pub mod site;

/// This module contains the Logoot sequence and its position algebra.
pub mod seq;

// Top-level re-exports
pub use crate::{
    seq::ident::{
        compare_identifiers, compare_positions, generate_position, generate_position_with,
        Identifier, Position, MAX_POS,
    },
    seq::{
        compare_atom_identifiers, find_slot, generate_atom_identifier,
        generate_atom_identifier_with, insert_atom, Atom, AtomIdent, Op, Sequence, Slot,
    },
    site::{Counter, Site, SiteId},
};
