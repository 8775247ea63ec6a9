// Shared application state handed to every accepted connection's session
// task (spec.md §2 "Control flow").

use std::sync::Arc;

use crate::interface_adapters::net::connections::ConnectionRegistry;
use crate::use_cases::identity::IdentityRegistry;
use crate::use_cases::lobby::LobbyRegistry;

#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionRegistry>,
    pub identity: Arc<IdentityRegistry>,
    pub lobbies: Arc<LobbyRegistry>,
}
