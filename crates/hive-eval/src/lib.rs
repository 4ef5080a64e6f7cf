//! Shared helpers for the HoneyHive evaluation bridge/runtime implementations.
//! This crate provides comment-marker utilities, pull-request data types, and
//! status-comment rendering helpers consumed by the runtime crate.

pub mod comment_marker;
pub mod evaluation;
pub mod pull_request;
pub mod report_render;
