//! Compiles combinatorial DNA assembly designs into plate layouts,
//! liquid-handler transfer lists and thermocycler programs.

pub mod about;
pub mod assembly;
pub mod biomek;
pub mod bundle;
pub mod colony;
pub mod condense;
pub mod design;
pub mod digests;
pub mod distribute;
pub mod equimolar;
pub mod error;
pub mod input;
pub mod instructions;
pub mod lp;
pub mod parts;
pub mod pcr;
pub mod pipeline;
pub mod plates;
pub mod readme;
pub mod redo;
pub mod registry;
pub mod sequence;
pub mod settings;
pub mod table;
pub mod thermocycler;
pub mod tm_service;
pub mod volume;
pub mod wells;

pub use error::{CompileError, Result};
pub use pipeline::{compile, compile_many};
