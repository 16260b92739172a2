//! Metric names emitted by the socket channel.

pub const EVENT_TOTAL: &str = "tds_admin_socket_event_total";
pub const FRAME_DROPPED_TOTAL: &str = "tds_admin_socket_frame_dropped_total";
pub const RECONNECT_TOTAL: &str = "tds_admin_socket_reconnect_total";
