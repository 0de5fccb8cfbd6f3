//! Device identity: the access point name and its color code.
//!
//! The name is [`SSID_PREFIX`] followed by four palette letters, e.g.
//! `BlynkMeRGYP`. The same four colors are blinked on the LED in config mode,
//! so a user can tell which board is which. The suffix is drawn once and then
//! frozen in the record.

use crate::indicator::Rgb;
use crate::settings::{SSID_PREFIX, SSID_SUFFIX_LEN};
use crate::store::{ConfigStore, ProvisioningRecord};
use log::{error, info};
use rand_core::RngCore;

/// Number of symbols in the palette.
pub const PALETTE_LEN: usize = 5;

/// Palette symbol for the SSID suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsidColor {
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
}

impl SsidColor {
    pub const ALL: [SsidColor; PALETTE_LEN] = [
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Yellow,
        Self::Purple,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Letter used in the SSID.
    pub fn symbol(self) -> char {
        match self {
            Self::Red => 'R',
            Self::Green => 'G',
            Self::Blue => 'B',
            Self::Yellow => 'Y',
            Self::Purple => 'P',
        }
    }

    /// LED color shown for this symbol.
    pub fn rgb(self) -> Rgb {
        match self {
            Self::Red => Rgb(0x200000),
            Self::Green => Rgb(0x002000),
            Self::Blue => Rgb(0x000020),
            Self::Yellow => Rgb(0x202000),
            Self::Purple => Rgb(0x200040),
        }
    }
}

/// The board's access point identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub suffix: [SsidColor; SSID_SUFFIX_LEN],
}

impl DeviceIdentity {
    /// Build from stored palette indices. Out-of-range indices are rejected.
    pub fn from_indices(indices: [u8; SSID_SUFFIX_LEN]) -> Option<Self> {
        let mut suffix = [SsidColor::Red; SSID_SUFFIX_LEN];
        for (slot, index) in suffix.iter_mut().zip(indices) {
            *slot = SsidColor::from_index(index)?;
        }
        Some(Self { suffix })
    }

    /// Palette indices, as stored in the record.
    pub fn indices(&self) -> [u8; SSID_SUFFIX_LEN] {
        let mut indices = [0u8; SSID_SUFFIX_LEN];
        for (index, color) in indices.iter_mut().zip(self.suffix) {
            // ALL lists every variant
            *index = SsidColor::ALL.iter().position(|c| *c == color).unwrap_or(0) as u8;
        }
        indices
    }

    /// Access point name, e.g. `BlynkMeRGBY`.
    pub fn ssid(&self) -> String {
        let mut ssid = String::with_capacity(SSID_PREFIX.len() + SSID_SUFFIX_LEN);
        ssid.push_str(SSID_PREFIX);
        ssid.extend(self.suffix.iter().map(|c| c.symbol()));
        ssid
    }

    /// LED colors of the suffix, in order.
    pub fn colors(&self) -> [Rgb; SSID_SUFFIX_LEN] {
        self.suffix.map(SsidColor::rgb)
    }
}

/// Draw one palette index without modulo bias.
fn draw_index(rng: &mut dyn RngCore) -> u8 {
    // Largest multiple of PALETTE_LEN that fits in a byte
    const LIMIT: u8 = (256 / PALETTE_LEN * PALETTE_LEN) as u8;
    loop {
        let mut byte = [0u8; 1];
        rng.fill_bytes(&mut byte);
        if byte[0] < LIMIT {
            return byte[0] % PALETTE_LEN as u8;
        }
    }
}

/// Return the board's identity, generating and persisting it on first use.
///
/// Once `ssid_suffix_generated` is set the stored suffix is reused, so the
/// identity is stable across reboots. If persisting fails the new identity is
/// still returned and kept in `record`; it is saved again with the next
/// successful save.
pub fn generate_identity(
    store: &mut ConfigStore,
    record: &mut ProvisioningRecord,
    rng: &mut dyn RngCore,
) -> DeviceIdentity {
    if record.ssid_suffix_generated {
        if let Some(identity) = DeviceIdentity::from_indices(record.ssid_suffix) {
            return identity;
        }
        error!("Stored SSID suffix is invalid, generating a new one");
    }

    let mut indices = [0u8; SSID_SUFFIX_LEN];
    for index in indices.iter_mut() {
        *index = draw_index(rng);
    }
    record.ssid_suffix = indices;
    record.ssid_suffix_generated = true;

    let identity = DeviceIdentity::from_indices(indices).unwrap_or(DeviceIdentity {
        suffix: [SsidColor::Red; SSID_SUFFIX_LEN],
    });
    info!("Generated device identity {}", identity.ssid());

    if let Err(e) = store.save(record) {
        error!("Failed to persist device identity: {}", e);
    }
    identity
}
