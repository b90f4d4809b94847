//! Provider Records
//!
//! Typed shape of one registry row after column extraction. Optional
//! fields are `None` when the source cell was blank.

use serde::Serialize;

/// One parsed registry row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedRecord {
    pub npi: NpiBlock,
    pub provider: Provider,
    pub names: Vec<Name>,
    pub addresses: Vec<Address>,
    pub licenses: Vec<License>,
    pub identifiers: Vec<OtherIdentifier>,
    pub taxonomy_groups: Vec<String>,
}

/// Identifier block; `npi` is kept verbatim from the first column
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NpiBlock {
    pub npi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement_npi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deactivation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactivation_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Provider {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employer_identification_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_organization_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enumeration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_name_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_name_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_official_credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sole_proprietor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_organization_subpart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_organization_lbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_organization_tin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameType {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Name {
    #[serde(rename = "type")]
    pub name_type: NameType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl Name {
    /// True when every field except the type discriminator is blank
    pub fn is_blank(&self) -> bool {
        [
            &self.last_name,
            &self.first_name,
            &self.middle_name,
            &self.prefix,
            &self.suffix,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Mailing,
    PracticeLocation,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Mailing => "mailing",
            AddressType::PracticeLocation => "practice_location",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Address {
    #[serde(rename = "type")]
    pub address_type: AddressType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fax_number: Option<String>,
}

impl Address {
    /// True when every field except the type discriminator is blank
    pub fn is_blank(&self) -> bool {
        [
            &self.street1,
            &self.street2,
            &self.city,
            &self.state,
            &self.zipcode,
            &self.country,
            &self.phone_number,
            &self.fax_number,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct License {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxonomy_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxonomy_switch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherIdentifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// A sub-record built from a fixed-size group of adjacent columns
pub trait ChunkRecord: Sized {
    /// Number of columns per group
    const WIDTH: usize;

    /// Build from exactly `WIDTH` cells, already blank-normalised
    fn from_cells(cells: Vec<Option<String>>) -> Self;
}

impl ChunkRecord for License {
    const WIDTH: usize = 4;

    fn from_cells(cells: Vec<Option<String>>) -> Self {
        let mut cells = cells.into_iter();
        License {
            taxonomy_code: cells.next().flatten(),
            number: cells.next().flatten(),
            state: cells.next().flatten(),
            taxonomy_switch: cells.next().flatten(),
        }
    }
}

impl ChunkRecord for OtherIdentifier {
    const WIDTH: usize = 3;

    fn from_cells(cells: Vec<Option<String>>) -> Self {
        let mut cells = cells.into_iter();
        OtherIdentifier {
            type_code: cells.next().flatten(),
            state: cells.next().flatten(),
            issuer: cells.next().flatten(),
        }
    }
}
