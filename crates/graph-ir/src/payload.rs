// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sealed delegate payloads.
//!
//! A payload is the compiled form of a captured subgraph. No pass may look
//! inside it: the bytes are only handed out to the backend that produced
//! them. Ownership is bound to the sealing type, so another type that
//! reports the same [`PayloadOwner::owner_id`] still cannot open it.

use std::fmt;

/// Anything that can claim ownership of a payload by backend id.
pub trait PayloadOwner {
    /// Backend identity, e.g. `"reference"`.
    fn owner_id(&self) -> &str;
}

/// Opaque compiled bytes tagged with the id of the backend that owns them.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DelegatePayload {
    owner: String,
    sealer: String,
    bytes: Vec<u8>,
}

impl DelegatePayload {
    /// Seals `bytes` for the given owner.
    pub fn seal<O: PayloadOwner>(owner: &O, bytes: Vec<u8>) -> Self {
        Self {
            owner: owner.owner_id().to_string(),
            sealer: std::any::type_name::<O>().to_string(),
            bytes,
        }
    }

    /// Id of the owning backend.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Releases the bytes if `owner` is the backend that sealed them:
    /// same id and same concrete type.
    pub fn open<O: PayloadOwner>(&self, owner: &O) -> Option<&[u8]> {
        let sealer = std::any::type_name::<O>();
        (owner.owner_id() == self.owner && sealer == self.sealer).then_some(self.bytes.as_slice())
    }
}

// Never print the contents.
impl fmt::Debug for DelegatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatePayload")
            .field("owner", &self.owner)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner(&'static str);

    impl PayloadOwner for Owner {
        fn owner_id(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_open_only_for_owner() {
        let p = DelegatePayload::seal(&Owner("a"), vec![1, 2, 3]);
        assert_eq!(p.open(&Owner("a")), Some(&[1u8, 2, 3][..]));
        assert_eq!(p.open(&Owner("b")), None);
        assert_eq!(p.owner(), "a");
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_same_id_from_another_type_is_refused() {
        struct Impostor;
        impl PayloadOwner for Impostor {
            fn owner_id(&self) -> &str {
                "a"
            }
        }

        let p = DelegatePayload::seal(&Owner("a"), vec![7; 4]);
        assert_eq!(p.open(&Impostor), None);
        assert_eq!(p.open(&Owner("a")).map(<[u8]>::len), Some(4));
    }

    #[test]
    fn test_debug_hides_bytes() {
        let p = DelegatePayload::seal(&Owner("a"), vec![42; 8]);
        let s = format!("{p:?}");
        assert!(s.contains("len: 8"));
        assert!(!s.contains("42"));
    }
}
