//! Data types that flow through the analyze pipeline.
//!
//! `upload` holds the inbound request and its staging file; `inspection`
//! holds the classification result, the persisted record, and the response
//! contract.

pub mod inspection;
pub mod upload;
