//! Engine-side error types

use thiserror::Error;

use crate::types::TransportState;

/// A transport operation was issued in a state that does not permit it
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Cannot {operation} while {state:?}")]
pub struct InvalidStateError {
    /// Operation that was rejected
    pub operation: &'static str,
    /// Transport state at the time of the call
    pub state: TransportState,
}

impl InvalidStateError {
    pub fn new(operation: &'static str, state: TransportState) -> Self {
        Self { operation, state }
    }
}

/// A numeric parameter fell outside its legal range
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{param} out of range: {value} (expected {min} to {max})")]
pub struct InvalidParamError {
    pub param: &'static str,
    pub value: f32,
    pub min: f32,
    pub max: f32,
}

impl InvalidParamError {
    pub fn new(param: &'static str, value: f32, min: f32, max: f32) -> Self {
        Self {
            param,
            value,
            min,
            max,
        }
    }
}
