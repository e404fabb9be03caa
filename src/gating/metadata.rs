//! Asset metadata accounts.
//!
//! Only the prefix of the token metadata account needed for collection
//! gating is decoded; trailing fields (uses, programmable config and
//! padding) are ignored.

use crate::error::Result;
use crate::program::accounts::AccountLayout;
use crate::program::layout::{ByteReader, ByteWriter};
use crate::pubkey::Pubkey;

/// Account key byte of a v1 metadata account.
pub const METADATA_KEY_V1: u8 = 4;

/// Verified-or-not creator entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Creator {
    /// Creator address.
    pub address: Pubkey,
    /// Whether the creator signed.
    pub verified: bool,
    /// Royalty share in percent.
    pub share: u8,
}

/// Collection membership claimed by an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    /// Whether the collection authority verified the membership.
    pub verified: bool,
    /// Collection mint.
    pub key: Pubkey,
}

/// Decoded metadata of one mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    /// Metadata update authority.
    pub update_authority: Pubkey,
    /// Described mint.
    pub mint: Pubkey,
    /// Asset name, without padding.
    pub name: String,
    /// Ticker symbol, without padding.
    pub symbol: String,
    /// Off-ledger JSON location, without padding.
    pub uri: String,
    /// Secondary sale royalty.
    pub seller_fee_basis_points: u16,
    /// Creators, if any.
    pub creators: Option<Vec<Creator>>,
    /// Primary sale flag.
    pub primary_sale_happened: bool,
    /// Whether the metadata may change.
    pub is_mutable: bool,
    /// Edition bump.
    pub edition_nonce: Option<u8>,
    /// Token standard tag.
    pub token_standard: Option<u8>,
    /// Collection membership.
    pub collection: Option<Collection>,
}

impl AssetMetadata {
    /// Metadata for `mint` with no creators and the given collection.
    pub fn new(mint: Pubkey, name: impl Into<String>, collection: Option<Collection>) -> Self {
        Self {
            update_authority: Pubkey::default(),
            mint,
            name: name.into(),
            symbol: String::new(),
            uri: String::new(),
            seller_fee_basis_points: 0,
            creators: None,
            primary_sale_happened: false,
            is_mutable: true,
            edition_nonce: None,
            token_standard: None,
            collection,
        }
    }

    /// Collection key if membership is present and verified.
    pub fn verified_collection(&self) -> Option<&Pubkey> {
        self.collection
            .as_ref()
            .filter(|collection| collection.verified)
            .map(|collection| &collection.key)
    }
}

fn read_padded_string(r: &mut ByteReader<'_>) -> Result<String> {
    Ok(r.read_string()?.trim_end_matches('\0').to_string())
}

fn read_option_u8(r: &mut ByteReader<'_>) -> Result<Option<u8>> {
    if r.read_option_tag()? {
        Ok(Some(r.read_u8()?))
    } else {
        Ok(None)
    }
}

fn write_option_u8(w: &mut ByteWriter, value: Option<u8>) {
    match value {
        Some(v) => {
            w.put_u8(1).put_u8(v);
        }
        None => {
            w.put_u8(0);
        }
    }
}

impl AccountLayout for AssetMetadata {
    const KIND: &'static str = "asset metadata";

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let key = r.read_u8()?;
        if key != METADATA_KEY_V1 {
            return Err(crate::error::DispatchError::serialization(format!(
                "Unexpected metadata key byte {}",
                key
            )));
        }
        let update_authority = r.read_pubkey()?;
        let mint = r.read_pubkey()?;
        let name = read_padded_string(r)?;
        let symbol = read_padded_string(r)?;
        let uri = read_padded_string(r)?;
        let seller_fee_basis_points = r.read_u16()?;
        let creators = if r.read_option_tag()? {
            let len = r.read_list_len()?;
            let mut creators = Vec::with_capacity(len);
            for _ in 0..len {
                creators.push(Creator {
                    address: r.read_pubkey()?,
                    verified: r.read_bool()?,
                    share: r.read_u8()?,
                });
            }
            Some(creators)
        } else {
            None
        };
        let primary_sale_happened = r.read_bool()?;
        let is_mutable = r.read_bool()?;
        let edition_nonce = read_option_u8(r)?;
        let token_standard = read_option_u8(r)?;
        let collection = if r.read_option_tag()? {
            Some(Collection {
                verified: r.read_bool()?,
                key: r.read_pubkey()?,
            })
        } else {
            None
        };

        Ok(Self {
            update_authority,
            mint,
            name,
            symbol,
            uri,
            seller_fee_basis_points,
            creators,
            primary_sale_happened,
            is_mutable,
            edition_nonce,
            token_standard,
            collection,
        })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.put_u8(METADATA_KEY_V1)
            .put_pubkey(&self.update_authority)
            .put_pubkey(&self.mint)
            .put_string(&self.name)
            .put_string(&self.symbol)
            .put_string(&self.uri)
            .put_u16(self.seller_fee_basis_points);
        match &self.creators {
            Some(creators) => {
                w.put_u8(1).put_u32(creators.len() as u32);
                for creator in creators {
                    w.put_pubkey(&creator.address)
                        .put_bool(creator.verified)
                        .put_u8(creator.share);
                }
            }
            None => {
                w.put_u8(0);
            }
        }
        w.put_bool(self.primary_sale_happened).put_bool(self.is_mutable);
        write_option_u8(w, self.edition_nonce);
        write_option_u8(w, self.token_standard);
        match &self.collection {
            Some(collection) => {
                w.put_u8(1)
                    .put_bool(collection.verified)
                    .put_pubkey(&collection.key);
            }
            None => {
                w.put_u8(0);
            }
        }
        // uses: None
        w.put_u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_names_are_trimmed() {
        let mut meta = AssetMetadata::new(Pubkey::new_unique(), "Ape #1\0\0\0\0", None);
        meta.symbol = "APE\0\0".to_string();
        let decoded = AssetMetadata::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(decoded.name, "Ape #1");
        assert_eq!(decoded.symbol, "APE");
    }

    #[test]
    fn test_unverified_collection_is_not_reported() {
        let key = Pubkey::new_unique();
        let meta = AssetMetadata::new(
            Pubkey::new_unique(),
            "x",
            Some(Collection {
                verified: false,
                key,
            }),
        );
        assert!(meta.verified_collection().is_none());

        let verified = AssetMetadata::new(
            Pubkey::new_unique(),
            "x",
            Some(Collection {
                verified: true,
                key,
            }),
        );
        let decoded = AssetMetadata::from_bytes(&verified.to_bytes()).unwrap();
        assert_eq!(decoded.verified_collection(), Some(&key));
    }

    #[test]
    fn test_creators_survive_encoding() {
        let mut meta = AssetMetadata::new(Pubkey::new_unique(), "x", None);
        meta.creators = Some(vec![Creator {
            address: Pubkey::new_unique(),
            verified: true,
            share: 100,
        }]);
        assert_eq!(AssetMetadata::from_bytes(&meta.to_bytes()).unwrap(), meta);
    }

    #[test]
    fn test_wrong_key_byte_rejected() {
        let mut bytes = AssetMetadata::new(Pubkey::new_unique(), "x", None).to_bytes();
        bytes[0] = 1;
        assert!(AssetMetadata::from_bytes(&bytes).is_err());
    }
}
