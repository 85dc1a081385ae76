//! Thin clients for the two external collaborators this crate depends on
//! but does not own: the embedding RPC and object storage. Both are
//! `reqwest::Client` wrappers configured with `secrecy::SecretString`
//! credentials where applicable, following the shape of the teacher's
//! `inference::cloud::CloudBridge`.

pub mod embedding;
pub mod error;
pub mod object_store;

pub use error::Error;
