pub mod control_plane_port;
pub mod metrics_port;
