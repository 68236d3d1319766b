#![forbid(unsafe_code)]

pub mod alg_service_impl;
pub mod pinhole_pipeline;
