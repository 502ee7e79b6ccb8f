// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF standard security handler, revision 3 (RC4, 128-bit key).
//
// Derives the /O and /U entries and the file key from the passwords, and
// encrypts individual strings and streams with the per-object key.

use docforge_core::error::{ForgeError, Result};
use docforge_core::settings::Permissions;
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher};
use tracing::{debug, instrument};

/// Key length in bytes (128 bits).
pub const KEY_LEN: usize = 16;

/// Password padding string from the standard security handler.
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Everything needed to write the `/Encrypt` dictionary and encrypt objects.
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    pub owner_value: [u8; 32],
    pub user_value: [u8; 32],
    pub permissions: i32,
    file_key: [u8; KEY_LEN],
}

impl SecurityHandler {
    /// Derive the handler for `user_password` / `owner_password`. An absent
    /// owner password falls back to the user password.
    #[instrument(skip_all)]
    pub fn new(
        user_password: &str,
        owner_password: Option<&str>,
        permissions: &Permissions,
        file_id: &[u8],
    ) -> Result<Self> {
        let owner = owner_password
            .filter(|p| !p.is_empty())
            .unwrap_or(user_password);
        let p = permission_bits(permissions);
        let owner_value = compute_owner_value(owner.as_bytes(), user_password.as_bytes())?;
        let file_key = compute_file_key(user_password.as_bytes(), &owner_value, p, file_id);
        let user_value = compute_user_value(&file_key, file_id)?;

        debug!(permissions = p, "security handler derived");
        Ok(Self {
            owner_value,
            user_value,
            permissions: p,
            file_key,
        })
    }

    /// Encrypt (or decrypt, RC4 is symmetric) `data` belonging to object
    /// `(number, generation)` in place.
    pub fn apply(&self, number: u32, generation: u16, data: &mut [u8]) -> Result<()> {
        let key = self.object_key(number, generation);
        rc4_in_place(&key, data)
    }

    /// Whether `password` opens the document as the user.
    pub fn authenticate_user(&self, password: &str, file_id: &[u8]) -> bool {
        let key = compute_file_key(password.as_bytes(), &self.owner_value, self.permissions, file_id);
        match compute_user_value(&key, file_id) {
            Ok(u) => u[..16] == self.user_value[..16],
            Err(_) => false,
        }
    }

    fn object_key(&self, number: u32, generation: u16) -> [u8; KEY_LEN] {
        let mut ctx = md5::Context::new();
        ctx.consume(self.file_key);
        ctx.consume(&number.to_le_bytes()[..3]);
        ctx.consume(&generation.to_le_bytes()[..2]);
        // min(n + 5, 16) is 16 for a 128-bit file key.
        ctx.compute().0
    }
}

/// The /P value for revision 3. Reserved bits 7–8 and 13–32 are set.
pub fn permission_bits(permissions: &Permissions) -> i32 {
    let mut bits: u32 = 0xFFFF_F0C0;
    // Extract for accessibility is always granted.
    bits |= 1 << 9;
    if permissions.print {
        bits |= (1 << 2) | (1 << 11);
    }
    if permissions.modify {
        bits |= (1 << 3) | (1 << 10);
    }
    if permissions.copy {
        bits |= 1 << 4;
    }
    if permissions.annotate {
        bits |= (1 << 5) | (1 << 8);
    }
    bits as i32
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let n = password.len().min(32);
    padded[..n].copy_from_slice(&password[..n]);
    padded[n..].copy_from_slice(&PADDING[..32 - n]);
    padded
}

fn rc4_in_place(key: &[u8], data: &mut [u8]) -> Result<()> {
    let mut cipher = Rc4::<U16>::new_from_slice(key)
        .map_err(|e| ForgeError::Encryption(format!("bad RC4 key: {e}")))?;
    cipher.apply_keystream(data);
    Ok(())
}

/// RC4 with `key`, then 19 more rounds with each key byte XORed by the round.
fn rc4_twenty_rounds(key: &[u8; KEY_LEN], data: &mut [u8]) -> Result<()> {
    for round in 0u8..20 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
        rc4_in_place(&round_key, data)?;
    }
    Ok(())
}

fn compute_owner_value(owner: &[u8], user: &[u8]) -> Result<[u8; 32]> {
    let mut digest = md5::compute(pad_password(owner)).0;
    for _ in 0..50 {
        digest = md5::compute(digest).0;
    }
    let mut value = pad_password(user);
    rc4_twenty_rounds(&digest, &mut value)?;
    Ok(value)
}

fn compute_file_key(user: &[u8], owner_value: &[u8; 32], p: i32, file_id: &[u8]) -> [u8; KEY_LEN] {
    let mut ctx = md5::Context::new();
    ctx.consume(pad_password(user));
    ctx.consume(owner_value);
    ctx.consume(p.to_le_bytes());
    ctx.consume(file_id);
    let mut digest = ctx.compute().0;
    for _ in 0..50 {
        digest = md5::compute(digest).0;
    }
    digest
}

fn compute_user_value(file_key: &[u8; KEY_LEN], file_id: &[u8]) -> Result<[u8; 32]> {
    let mut ctx = md5::Context::new();
    ctx.consume(PADDING);
    ctx.consume(file_id);
    let mut hash = ctx.compute().0;
    rc4_twenty_rounds(file_key, &mut hash)?;

    let mut value = [0u8; 32];
    value[..16].copy_from_slice(&hash);
    value[16..].copy_from_slice(&PADDING[..16]);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_ID: &[u8] = b"0123456789abcdef";

    #[test]
    fn padding_fills_short_passwords() {
        let padded = pad_password(b"abc");
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(&padded[3..], &PADDING[..29]);
        assert_eq!(pad_password(b""), PADDING);
    }

    #[test]
    fn permissions_set_reserved_bits() {
        let none = Permissions {
            print: false,
            modify: false,
            copy: false,
            annotate: false,
        };
        let bits = permission_bits(&none) as u32;
        assert_eq!(bits & 0xC0, 0xC0);
        assert_eq!(bits & 0xFFFF_F000, 0xFFFF_F000);
        assert_eq!(bits & (1 << 2), 0);

        let print_only = Permissions {
            print: true,
            ..none
        };
        assert_ne!(permission_bits(&print_only) as u32 & (1 << 2), 0);
    }

    #[test]
    fn user_password_authenticates() {
        let handler =
            SecurityHandler::new("secret", Some("owner"), &Permissions::default(), FILE_ID).unwrap();
        assert!(handler.authenticate_user("secret", FILE_ID));
        assert!(!handler.authenticate_user("wrong", FILE_ID));
    }

    #[test]
    fn object_encryption_is_symmetric_and_keyed_per_object() {
        let handler = SecurityHandler::new("pw", None, &Permissions::default(), FILE_ID).unwrap();
        let plain = b"BT /F1 12 Tf (hello) Tj ET".to_vec();

        let mut a = plain.clone();
        handler.apply(4, 0, &mut a).unwrap();
        assert_ne!(a, plain);

        let mut b = plain.clone();
        handler.apply(5, 0, &mut b).unwrap();
        assert_ne!(a, b);

        handler.apply(4, 0, &mut a).unwrap();
        assert_eq!(a, plain);
    }
}
