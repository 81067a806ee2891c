//! The question-answering state machine.
//!
//! [`workflow::Workflow`] is an immutable transition table built once;
//! [`pipeline::Pipeline`] walks it per request, threading a
//! [`state::RequestState`] through every node by value.

pub mod pipeline;
pub mod state;
pub mod workflow;

pub use pipeline::{Components, Pipeline};
pub use state::{Datasource, Passage, RequestState, RouteDecision, RunRecord};
pub use workflow::{Branch, Node, Target, Workflow};
