//! The connected-client table and the fan-out rules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use roomcast_protocol::Visibility;
use roomcast_transport::SocketHandle;

use crate::LastState;

/// Ids below this are never handed out.
pub const FIRST_CLIENT_ID: u16 = 10;

/// Server-assigned id of a connected client, stamped on every packet
/// relayed on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u16);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One queued broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub from: ClientId,
    /// Room for LOCAL sends. `None` means the sender's room at fan-out
    /// time.
    pub to: Option<u16>,
    /// `Null` addresses the sender alone.
    pub visibility: Visibility,
    /// A bulk, or a control signal.
    pub data: Vec<u8>,
    /// Deliver to the sender as well.
    pub return_flag: bool,
}

impl SendRequest {
    /// A request delivered to the sender only.
    pub fn direct(from: ClientId, data: Vec<u8>) -> Self {
        Self {
            from,
            to: None,
            visibility: Visibility::Null,
            data,
            return_flag: true,
        }
    }
}

/// A connected client as the relay sees it.
#[derive(Debug)]
pub struct ClientEntry {
    pub socket: SocketHandle,
    pub room_id: u16,
    /// Crypt chat group. Zero until the client sets one.
    pub crypt_key_hash: u32,
    pub name: String,
    pub last: LastState,
}

impl ClientEntry {
    fn new(socket: SocketHandle) -> Self {
        Self {
            socket,
            room_id: 0,
            crypt_key_hash: 0,
            name: String::new(),
            last: LastState::default(),
        }
    }
}

#[derive(Debug)]
struct TableInner {
    clients: BTreeMap<ClientId, ClientEntry>,
    next_id: u16,
}

/// Every connected client, behind one mutex.
///
/// Handlers mutate their own entry through [`with_client`]; the fan-out
/// loop reads the whole table through [`recipients`]. Iteration is in id
/// order, so fan-out order is deterministic.
///
/// [`with_client`]: Self::with_client
/// [`recipients`]: Self::recipients
#[derive(Debug)]
pub struct ClientTable {
    inner: Mutex<TableInner>,
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                clients: BTreeMap::new(),
                next_id: FIRST_CLIENT_ID,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a client unless `max_clients` are already connected.
    ///
    /// Ids increase from [`FIRST_CLIENT_ID`], wrap around, and skip ids
    /// still in use.
    pub fn insert(&self, socket: SocketHandle, max_clients: usize) -> Option<ClientId> {
        let mut inner = self.lock();
        if inner.clients.len() >= max_clients {
            return None;
        }
        let span = usize::from(u16::MAX - FIRST_CLIENT_ID) + 1;
        for _ in 0..span {
            let id = ClientId(inner.next_id);
            inner.next_id = match inner.next_id.checked_add(1) {
                Some(next) => next,
                None => FIRST_CLIENT_ID,
            };
            if !inner.clients.contains_key(&id) {
                inner.clients.insert(id, ClientEntry::new(socket));
                return Some(id);
            }
        }
        None
    }

    pub fn remove(&self, id: ClientId) -> Option<ClientEntry> {
        self.lock().clients.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().clients.is_empty()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().clients.contains_key(&id)
    }

    /// Runs `f` on one client's entry under the table lock.
    pub fn with_client<R>(&self, id: ClientId, f: impl FnOnce(&mut ClientEntry) -> R) -> Option<R> {
        self.lock().clients.get_mut(&id).map(f)
    }

    /// Sockets of every connected client.
    pub fn sockets(&self) -> Vec<SocketHandle> {
        self.lock().clients.values().map(|c| c.socket.clone()).collect()
    }

    /// Serialized state of every other client in `room_id`, in id order,
    /// for a client that just entered it.
    pub fn room_replay(&self, joiner: ClientId, room_id: u16) -> Vec<Vec<u8>> {
        self.lock()
            .clients
            .iter()
            .filter(|(id, c)| **id != joiner && c.room_id == room_id)
            .flat_map(|(id, c)| c.last.replay(id.0, &c.name))
            .collect()
    }

    /// Who receives `request`.
    ///
    /// - GLOBAL: every client.
    /// - LOCAL: clients in `request.to`, or in the sender's room.
    /// - CRYPT: clients sharing the sender's non-zero crypt key hash. A
    ///   sender that never set a key shares a group with nobody.
    /// - NULL: the sender alone.
    ///
    /// The sender itself is included only when `return_flag` is set. A
    /// sender that has already left reaches nobody through LOCAL without
    /// an explicit room, CRYPT, or NULL.
    pub fn recipients(&self, request: &SendRequest) -> Vec<SocketHandle> {
        let inner = self.lock();
        let sender = inner.clients.get(&request.from);

        let in_scope: Box<dyn Fn(&ClientEntry) -> bool> = match request.visibility {
            Visibility::Null => {
                return sender.map(|c| vec![c.socket.clone()]).unwrap_or_default();
            }
            Visibility::Global => Box::new(|_: &ClientEntry| true),
            Visibility::Local => match request.to.or(sender.map(|c| c.room_id)) {
                Some(room_id) => Box::new(move |c: &ClientEntry| c.room_id == room_id),
                None => return Vec::new(),
            },
            Visibility::Crypt => match sender.map(|c| c.crypt_key_hash) {
                Some(hash) if hash != 0 => {
                    Box::new(move |c: &ClientEntry| c.crypt_key_hash == hash)
                }
                Some(_) => Box::new(|_: &ClientEntry| false),
                None => return Vec::new(),
            },
        };

        inner
            .clients
            .iter()
            .filter(|(id, c)| {
                if **id == request.from {
                    request.return_flag
                } else {
                    in_scope(c)
                }
            })
            .map(|(_, c)| c.socket.clone())
            .collect()
    }
}
