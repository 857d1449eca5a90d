//! Collaborators consulted by reasoning loops: model, memory and transport

pub mod memory;
pub mod model;
pub mod openai;
pub mod transport;
