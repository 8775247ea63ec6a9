// Cross-cutting timing constants shared by the match engine and session
// driver (spec.md §5).

use std::time::Duration;

pub const TURN_TIMEOUT: Duration = Duration::from_secs(30);
pub const RECONNECT_WINDOW: Duration = Duration::from_secs(30);
pub const PING_INTERVAL: Duration = Duration::from_secs(5);
pub const PONG_GRACE: Duration = Duration::from_secs(10);
pub const LOBBY_POLL_INTERVAL: Duration = Duration::from_millis(100);
