/// Upper bound on configured proxy modules.
pub const MAX_MODULES: usize = 64;

/// Default cap on concurrent proxy sessions (0 = unlimited).
pub const DEFAULT_MAX_SESSIONS: usize = 65_536;

/// Default depth of the pinhole command queue.
pub const DEFAULT_PINHOLE_QUEUE_DEPTH: usize = 1024;
