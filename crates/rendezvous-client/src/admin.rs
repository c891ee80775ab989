//! Administrative control operations.
//!
//! The admin surface is a thin token-bearing client: rotate the admin
//! token, wipe the development server, and allow-list users by handing out
//! registration pins.

use rendezvous_core::{RendezvousError, Result};
use rendezvous_proto::{AllowedUser, AuthToken, from_bytes};

use crate::transport::{Request, ServerTransport, encode_header, headers};

/// Token-bearing administrative client.
pub struct Admin<T> {
    transport: T,
    token: AuthToken,
}

impl<T: ServerTransport> Admin<T> {
    /// Create an admin client holding the all-zero token a freshly reset
    /// development server accepts.
    pub fn new(transport: T) -> Self {
        Self::with_token(transport, AuthToken::ZERO)
    }

    /// Create an admin client with a known token.
    pub fn with_token(transport: T, token: AuthToken) -> Self {
        Self { transport, token }
    }

    /// The currently held admin token.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Unauthenticated server health check.
    pub async fn ping(&self) -> Result<()> {
        self.transport.request(Request::get("ping")).await.map(|_| ())
    }

    /// Rotate the admin token.
    ///
    /// The old token authorizes the request; the response body carries the
    /// new 16-byte token, which replaces the held one.
    ///
    /// # Errors
    ///
    /// `InvalidServerData` if the response is not exactly 16 bytes.
    pub async fn update_admin_token(&mut self) -> Result<()> {
        let request = Request::get("admin/renew").header(headers::AUTH, self.auth());
        let body = self.transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }

        self.token = AuthToken::from_slice(&body).ok_or_else(|| {
            RendezvousError::InvalidServerData { reason: "malformed admin token".to_string() }
        })?;
        tracing::debug!("admin token rotated");
        Ok(())
    }

    /// Wipe the development server and reset the held token to all zeros.
    pub async fn reset_development_server(&mut self) -> Result<()> {
        let request = Request::get("admin/reset").header(headers::AUTH, self.auth());
        self.transport.request(request).await?;

        self.token = AuthToken::ZERO;
        Ok(())
    }

    /// Allow-list `name` for registration.
    ///
    /// Returns the pin to hand to the user and its absolute expiry time.
    /// Clients do not enforce the expiry; by convention it lies at least six
    /// days in the future.
    pub async fn allow(&self, name: &str) -> Result<AllowedUser> {
        let request = Request::post("user/allow", Vec::new())
            .header(headers::AUTH, self.auth())
            .header(headers::USERNAME, name.to_string());
        let body = self.transport.request(request).await?;
        if body.is_empty() {
            return Err(RendezvousError::NoDataInResponse);
        }

        Ok(from_bytes(&body)?)
    }

    fn auth(&self) -> String {
        encode_header(self.token.as_bytes())
    }
}
