// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Password protection with the standard security handler (RC4, 128-bit).

use docforge_core::error::{ForgeError, Result};
use docforge_core::results::ProtectResult;
use docforge_core::settings::ProtectSettings;
use docforge_core::CancelToken;
use docforge_security::encryption::KEY_LEN;
use docforge_security::{SecurityHandler, hash_bytes};
use lopdf::{Object, ObjectId, StringFormat, dictionary};
use tracing::{debug, info, instrument};

use crate::model::PdfDocument;

/// Every string inside `obj`, recursively.
fn encrypt_strings(obj: &mut Object, id: ObjectId, handler: &SecurityHandler) -> Result<()> {
    match obj {
        Object::String(bytes, _) => handler.apply(id.0, id.1, bytes),
        Object::Array(items) => items.iter_mut().try_for_each(|o| encrypt_strings(o, id, handler)),
        Object::Dictionary(dict) => dict
            .iter_mut()
            .try_for_each(|(_, o)| encrypt_strings(o, id, handler)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .try_for_each(|(_, o)| encrypt_strings(o, id, handler)),
        _ => Ok(()),
    }
}

fn is_xref_stream(obj: &Object) -> bool {
    matches!(obj, Object::Stream(s) if matches!(s.dict.get(b"Type"), Ok(Object::Name(n)) if n == b"XRef"))
}

/// The first element of the trailer /ID, creating the pair when missing.
fn ensure_file_id(doc: &mut PdfDocument) -> Vec<u8> {
    if let Ok(Object::Array(ids)) = doc.inner().trailer.get(b"ID")
        && let Some(Object::String(first, _)) = ids.first()
        && !first.is_empty()
    {
        return first.clone();
    }
    let seed = format!(
        "{}:{}:{}",
        chrono::Utc::now().to_rfc3339(),
        doc.page_count(),
        doc.inner().objects.len()
    );
    let hex = hash_bytes(seed.as_bytes());
    let id: Vec<u8> = (0..KEY_LEN)
        .filter_map(|i| u8::from_str_radix(hex.get(2 * i..2 * i + 2)?, 16).ok())
        .collect();
    doc.inner_mut().trailer.set(
        "ID",
        vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id.clone(), StringFormat::Hexadecimal),
        ],
    );
    id
}

/// Encrypt every string and stream of `doc` and install the /Encrypt
/// dictionary. Documents that are already encrypted are refused.
#[instrument(skip_all, fields(print = settings.permissions.print, modify = settings.permissions.modify))]
pub fn protect(doc: &mut PdfDocument, settings: &ProtectSettings, cancel: &CancelToken) -> Result<(SecurityHandler, ProtectResult)> {
    if doc.is_encrypted() {
        return Err(ForgeError::Encryption("document is already encrypted".into()));
    }
    let file_id = ensure_file_id(doc);
    let handler = SecurityHandler::new(
        &settings.user_password,
        settings.owner_password.as_deref(),
        &settings.permissions,
        &file_id,
    )?;
    cancel.check()?;

    let mut encrypted = 0;
    for (id, obj) in doc.inner_mut().objects.iter_mut() {
        if is_xref_stream(obj) {
            continue;
        }
        encrypt_strings(obj, *id, &handler)?;
        if let Object::Stream(stream) = obj {
            handler.apply(id.0, id.1, &mut stream.content)?;
        }
        encrypted += 1;
    }
    cancel.check()?;

    let encrypt = doc.inner_mut().add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 2i64,
        "R" => 3i64,
        "Length" => (KEY_LEN * 8) as i64,
        "O" => Object::String(handler.owner_value.to_vec(), StringFormat::Hexadecimal),
        "U" => Object::String(handler.user_value.to_vec(), StringFormat::Hexadecimal),
        "P" => handler.permissions as i64,
    });
    doc.inner_mut().trailer.set("Encrypt", encrypt);
    debug!(objects = encrypted, "objects encrypted");

    let result = ProtectResult {
        algorithm: "RC4".into(),
        key_bits: (KEY_LEN * 8) as u32,
        permissions: handler.permissions,
        objects_encrypted: encrypted,
    };
    info!(objects = encrypted, permissions = handler.permissions, "document protected");
    Ok((handler, result))
}
