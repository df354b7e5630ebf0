//! Pairwise connections known to the wallet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;
use crate::event::{ConnectionEvent, Event};

/// A pairwise connection with a remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Pairwise DID of this wallet; notifications name it as `forDID`.
    pub identifier: String,
    /// Pairwise DID of the remote party.
    #[serde(rename = "senderDID")]
    pub sender_did: String,
    /// Display name of the remote party.
    pub sender_name: String,
    /// Logo of the remote party.
    pub logo_url: Option<String>,
    /// Native serialization, used to get a connection handle.
    pub vcx_serialized_connection: Option<String>,
}

/// Every known connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionsState {
    /// Connections keyed by [`Connection::identifier`].
    pub connections: BTreeMap<String, Connection>,
    /// Last connection error.
    pub error: Option<ErrorInfo>,
}

pub(crate) fn reduce(state: &mut ConnectionsState, event: &Event) {
    let event = match event {
        Event::Reset => {
            *state = ConnectionsState::default();
            return;
        }
        Event::Connection(event) => event,
        _ => return,
    };

    match event {
        ConnectionEvent::NewConnectionSuccess(connection) => {
            state.error = None;
            state
                .connections
                .insert(connection.identifier.clone(), connection.clone());
        }
        ConnectionEvent::DeleteConnectionSuccess { identifier } => {
            state.error = None;
            state.connections.remove(identifier);
        }
        ConnectionEvent::HydrateConnections(connections) => {
            state.connections.clone_from(connections);
        }
        ConnectionEvent::NewConnectionFail(error)
        | ConnectionEvent::DeleteConnectionFail(error)
        | ConnectionEvent::HydrateConnectionsFail(error) => state.error = Some(error.clone()),
        ConnectionEvent::NewConnection(_)
        | ConnectionEvent::DeleteConnection { .. }
        | ConnectionEvent::AcceptInvitation(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_delete() {
        let mut state = ConnectionsState::default();
        let connection = Connection {
            identifier: "me".to_string(),
            sender_did: "them".to_string(),
            sender_name: "Them".to_string(),
            logo_url: None,
            vcx_serialized_connection: None,
        };
        reduce(
            &mut state,
            &Event::Connection(ConnectionEvent::NewConnectionSuccess(connection)),
        );
        assert!(state.connections.contains_key("me"));
        reduce(
            &mut state,
            &Event::Connection(ConnectionEvent::DeleteConnectionSuccess {
                identifier: "me".to_string(),
            }),
        );
        assert!(state.connections.is_empty());
    }
}
