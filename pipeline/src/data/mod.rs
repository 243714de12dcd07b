//! Data layer: relational store, job queues, blob storage

pub mod blobs;
pub mod postgres;
pub mod queue;
