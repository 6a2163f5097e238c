/// Type-state markers for the builder pattern
///
/// These types track which required collaborators have been supplied,
/// so `build()` only exists once the client is complete.

use std::marker::PhantomData;

/// Marker trait for transport state
pub trait TransportState {}

/// Transport has not been set
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Transport has been set
pub struct HasTransport;
impl TransportState for HasTransport {}

/// Marker trait for credential state
pub trait CredentialState {}

/// Credential provider has not been set
pub struct NoCredentials;
impl CredentialState for NoCredentials {}

/// Credential provider has been set
pub struct HasCredentials;
impl CredentialState for HasCredentials {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<T, C> {
    _transport: PhantomData<T>,
    _credentials: PhantomData<C>,
}

impl<T, C> TypeState<T, C> {
    pub(crate) fn new() -> Self {
        Self {
            _transport: PhantomData,
            _credentials: PhantomData,
        }
    }
}

impl<T, C> Default for TypeState<T, C> {
    fn default() -> Self {
        Self::new()
    }
}
