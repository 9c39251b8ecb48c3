//! Credential generation
//!
//! This module provides:
//! - Unique credential tokens derived from a (user, event) pair
//! - QR code rendering (error correction level L) to PNG
//! - Base64 transport encoding of the rendered image
//!
//! The random UUID component is the only source of token uniqueness. The
//! store's token index remains the authoritative guard against collisions.

use crate::config::CredentialConfig;
use crate::types::{CredentialToken, EventId, UserId};
use crate::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use uuid::Uuid;

/// Token format tag for the event component
const EVENT_TAG: &str = "EVENT";

/// Token format tag for the user component
const USER_TAG: &str = "USER";

/// Issued credential: token plus rendered QR code
#[derive(Debug, Clone)]
pub struct Credential {
    /// Unique token
    pub token: CredentialToken,

    /// PNG bytes
    pub image_png: Vec<u8>,
}

impl Credential {
    /// Image encoded for storage and transport
    pub fn image_base64(&self) -> String {
        encode_image(&self.image_png)
    }
}

/// Derives credential tokens and renders them as QR codes
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    module_size: u32,
    quiet_zone: bool,
}

impl Default for CredentialGenerator {
    fn default() -> Self {
        Self::new(&CredentialConfig::default())
    }
}

impl CredentialGenerator {
    /// Create generator with rendering parameters
    pub fn new(config: &CredentialConfig) -> Self {
        Self {
            module_size: config.module_size.max(1),
            quiet_zone: config.quiet_zone,
        }
    }

    /// Build `EVENT:<event_id>:USER:<user_id>:<uuid-v4>`
    pub fn generate_token(&self, user_id: UserId, event_id: EventId) -> CredentialToken {
        CredentialToken::new(format!(
            "{}:{}:{}:{}:{}",
            EVENT_TAG,
            event_id,
            USER_TAG,
            user_id,
            Uuid::new_v4()
        ))
    }

    /// Render token as a PNG QR code
    ///
    /// Deterministic for a given token and rendering parameters.
    pub fn render_image(&self, token: &CredentialToken) -> Result<Vec<u8>> {
        let code = QrCode::with_error_correction_level(token.as_str().as_bytes(), EcLevel::L)?;

        let image = code
            .render::<Luma<u8>>()
            .quiet_zone(self.quiet_zone)
            .module_dimensions(self.module_size, self.module_size)
            .build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        tracing::trace!(token = %token, bytes = png.len(), "Credential rendered");

        Ok(png)
    }

    /// Generate a token and render it
    pub fn issue(&self, user_id: UserId, event_id: EventId) -> Result<Credential> {
        let token = self.generate_token(user_id, event_id);
        let image_png = self.render_image(&token)?;
        Ok(Credential { token, image_png })
    }
}

/// Base64-encode image bytes
pub fn encode_image(png: &[u8]) -> String {
    STANDARD.encode(png)
}

/// Decode a base64 image back to raw bytes
pub fn decode_image(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| crate::Error::Encoding(format!("Invalid base64 image: {}", e)))
}
