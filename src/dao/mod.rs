//! Persistence layer: durable session store, question bank, and result sink.

pub mod models;
#[cfg(feature = "mongo-bank")]
pub mod mongodb;
pub mod question_bank;
pub mod result_sink;
pub mod session_store;
pub mod storage;
