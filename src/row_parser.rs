//! Registry Row Parser
//!
//! Maps one fixed-layout registry row onto a [`ParsedRecord`]. Field meaning
//! comes only from the column position; the header row is never consulted.

use crate::error::ParseError;
use crate::record::{
    Address, AddressType, ChunkRecord, License, Name, NameType, NpiBlock, OtherIdentifier,
    ParsedRecord, Provider,
};
use regex::Regex;
use std::ops::Range;

// ============================================================================
// Column Layout
// ============================================================================

mod columns {
    use std::ops::Range;

    pub const NPI: usize = 0;
    pub const REPLACEMENT_NPI: usize = 2;
    pub const EMPLOYER_IDENTIFICATION_NUMBER: usize = 3;
    pub const ORGANIZATION_NAME: usize = 4;
    /// last, first, middle, prefix, suffix
    pub const PRIMARY_NAME: usize = 5;
    pub const OTHER_ORGANIZATION: usize = 11;
    pub const OTHER_ORGANIZATION_TYPE: usize = 12;
    pub const SECONDARY_NAME: usize = 13;
    /// street1, street2, city, state, zipcode, country, phone, fax
    pub const MAILING_ADDRESS: usize = 20;
    pub const PRACTICE_LOCATION_ADDRESS: usize = 28;
    pub const ENUMERATION_DATE: usize = 36;
    pub const LAST_UPDATE_DATE: usize = 37;
    pub const DEACTIVATION_REASON: usize = 38;
    pub const DEACTIVATION_DATE: usize = 39;
    pub const REACTIVATION_DATE: usize = 40;
    pub const GENDER: usize = 41;
    pub const AUTHORIZED_OFFICIAL_LAST_NAME: usize = 42;
    pub const AUTHORIZED_OFFICIAL_FIRST_NAME: usize = 43;
    pub const AUTHORIZED_OFFICIAL_MIDDLE_NAME: usize = 44;
    pub const AUTHORIZED_OFFICIAL_TITLE: usize = 45;
    pub const AUTHORIZED_OFFICIAL_PHONE_NUMBER: usize = 46;
    /// 14 groups of (taxonomy code, number, state, taxonomy switch)
    pub const LICENSES: Range<usize> = 48..104;
    /// 66 groups of (type code, state, issuer)
    pub const IDENTIFIERS: Range<usize> = 107..305;
    pub const IS_SOLE_PROPRIETOR: usize = 307;
    pub const IS_ORGANIZATION_SUBPART: usize = 308;
    pub const PARENT_ORGANIZATION_LBN: usize = 309;
    pub const PARENT_ORGANIZATION_TIN: usize = 310;
    pub const AUTHORIZED_OFFICIAL_NAME_PREFIX: usize = 311;
    pub const AUTHORIZED_OFFICIAL_NAME_SUFFIX: usize = 312;
    pub const AUTHORIZED_OFFICIAL_CREDENTIAL: usize = 313;
    pub const TAXONOMY_GROUPS: Range<usize> = 314..328;
}

/// Columns of a full registry row
pub const ROW_LEN: usize = columns::TAXONOMY_GROUPS.end;

/// Number of columns a row must have to be parsed; the taxonomy groups
/// may be cut short
pub const MIN_ROW_LEN: usize = columns::AUTHORIZED_OFFICIAL_CREDENTIAL + 1;

// ============================================================================
// Cell Helpers
// ============================================================================

/// Only the empty cell is blank; whitespace is a value
pub fn is_blank(cell: &str) -> bool {
    cell.is_empty()
}

fn non_blank(cell: &str) -> Option<String> {
    if is_blank(cell) {
        None
    } else {
        Some(cell.to_string())
    }
}

struct Row<'a, S> {
    cells: &'a [S],
}

impl<'a, S: AsRef<str>> Row<'a, S> {
    fn text(&self, index: usize) -> Result<&'a str, ParseError> {
        self.cells
            .get(index)
            .map(|cell| cell.as_ref())
            .ok_or(ParseError::MissingColumn {
                index,
                len: self.cells.len(),
            })
    }

    fn optional(&self, index: usize) -> Result<Option<String>, ParseError> {
        self.text(index).map(non_blank)
    }

    fn span(&self, range: Range<usize>) -> Result<&'a [S], ParseError> {
        let len = self.cells.len();
        let last = range.end.saturating_sub(1);
        self.cells
            .get(range)
            .ok_or(ParseError::MissingColumn { index: last, len })
    }

    /// Cells of `range` that the row has, possibly none
    fn available(&self, range: Range<usize>) -> &'a [S] {
        let len = self.cells.len();
        &self.cells[range.start.min(len)..range.end.min(len)]
    }
}

/// Partition `data` into consecutive `T::WIDTH`-sized groups, drop groups
/// whose cells are all blank, and build one `T` per surviving group.
/// A trailing partial group is ignored.
pub fn normalize_chunks<T: ChunkRecord, S: AsRef<str>>(data: &[S]) -> Vec<T> {
    data.chunks_exact(T::WIDTH)
        .filter(|group| group.iter().any(|cell| !is_blank(cell.as_ref())))
        .map(|group| T::from_cells(group.iter().map(|cell| non_blank(cell.as_ref())).collect()))
        .collect()
}

// ============================================================================
// Parser
// ============================================================================

pub struct RowParser {
    zipcode_prefix: Regex,
}

impl RowParser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            zipcode_prefix: Regex::new(r"^[0-9]{5}")?,
        })
    }

    /// Parse one row. A row shorter than the layout fails with
    /// [`ParseError::MissingColumn`].
    pub fn parse<S: AsRef<str>>(&self, cells: &[S]) -> Result<ParsedRecord, ParseError> {
        let row = Row { cells };

        Ok(ParsedRecord {
            npi: parse_npi(&row)?,
            provider: parse_provider(&row)?,
            names: parse_names(&row)?,
            addresses: self.parse_addresses(&row)?,
            licenses: normalize_chunks::<License, S>(row.span(columns::LICENSES)?),
            identifiers: normalize_chunks::<OtherIdentifier, S>(row.span(columns::IDENTIFIERS)?),
            taxonomy_groups: row
                .available(columns::TAXONOMY_GROUPS)
                .iter()
                .filter_map(|cell| non_blank(cell.as_ref()))
                .collect(),
        })
    }

    /// Leading run of five digits, or an empty string when the value does
    /// not start with one.
    pub fn truncate_zipcode(&self, raw: &str) -> String {
        self.zipcode_prefix
            .find(raw)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    fn parse_addresses<S: AsRef<str>>(&self, row: &Row<'_, S>) -> Result<Vec<Address>, ParseError> {
        let addresses = vec![
            parse_address(row, AddressType::Mailing, columns::MAILING_ADDRESS)?,
            parse_address(
                row,
                AddressType::PracticeLocation,
                columns::PRACTICE_LOCATION_ADDRESS,
            )?,
        ];

        Ok(addresses
            .into_iter()
            .filter(|address| !address.is_blank())
            .map(|mut address| {
                address.zipcode = address
                    .zipcode
                    .as_deref()
                    .map(|raw| self.truncate_zipcode(raw))
                    .filter(|zip| !zip.is_empty());
                address
            })
            .collect())
    }
}

fn parse_npi<S: AsRef<str>>(row: &Row<'_, S>) -> Result<NpiBlock, ParseError> {
    Ok(NpiBlock {
        npi: row.text(columns::NPI)?.to_string(),
        replacement_npi: row.optional(columns::REPLACEMENT_NPI)?,
        deactivation_reason: row.optional(columns::DEACTIVATION_REASON)?,
        deactivation_date: row.optional(columns::DEACTIVATION_DATE)?,
        reactivation_date: row.optional(columns::REACTIVATION_DATE)?,
    })
}

fn parse_provider<S: AsRef<str>>(row: &Row<'_, S>) -> Result<Provider, ParseError> {
    Ok(Provider {
        employer_identification_number: row.optional(columns::EMPLOYER_IDENTIFICATION_NUMBER)?,
        organization_name: row.optional(columns::ORGANIZATION_NAME)?,
        other_organization: row.optional(columns::OTHER_ORGANIZATION)?,
        other_organization_type: row.optional(columns::OTHER_ORGANIZATION_TYPE)?,
        enumeration_date: row.optional(columns::ENUMERATION_DATE)?,
        last_update_date: row.optional(columns::LAST_UPDATE_DATE)?,
        gender: row.optional(columns::GENDER)?,
        authorized_official_last_name: row.optional(columns::AUTHORIZED_OFFICIAL_LAST_NAME)?,
        authorized_official_first_name: row.optional(columns::AUTHORIZED_OFFICIAL_FIRST_NAME)?,
        authorized_official_middle_name: row.optional(columns::AUTHORIZED_OFFICIAL_MIDDLE_NAME)?,
        authorized_official_title: row.optional(columns::AUTHORIZED_OFFICIAL_TITLE)?,
        authorized_official_phone_number: row
            .optional(columns::AUTHORIZED_OFFICIAL_PHONE_NUMBER)?,
        authorized_official_name_prefix: row.optional(columns::AUTHORIZED_OFFICIAL_NAME_PREFIX)?,
        authorized_official_name_suffix: row.optional(columns::AUTHORIZED_OFFICIAL_NAME_SUFFIX)?,
        authorized_official_credential: row.optional(columns::AUTHORIZED_OFFICIAL_CREDENTIAL)?,
        is_sole_proprietor: row.optional(columns::IS_SOLE_PROPRIETOR)?,
        is_organization_subpart: row.optional(columns::IS_ORGANIZATION_SUBPART)?,
        parent_organization_lbn: row.optional(columns::PARENT_ORGANIZATION_LBN)?,
        parent_organization_tin: row.optional(columns::PARENT_ORGANIZATION_TIN)?,
    })
}

fn parse_names<S: AsRef<str>>(row: &Row<'_, S>) -> Result<Vec<Name>, ParseError> {
    let names = vec![
        parse_name(row, NameType::Primary, columns::PRIMARY_NAME)?,
        parse_name(row, NameType::Secondary, columns::SECONDARY_NAME)?,
    ];
    Ok(names.into_iter().filter(|name| !name.is_blank()).collect())
}

fn parse_name<S: AsRef<str>>(
    row: &Row<'_, S>,
    name_type: NameType,
    start: usize,
) -> Result<Name, ParseError> {
    Ok(Name {
        name_type,
        last_name: row.optional(start)?,
        first_name: row.optional(start + 1)?,
        middle_name: row.optional(start + 2)?,
        prefix: row.optional(start + 3)?,
        suffix: row.optional(start + 4)?,
    })
}

fn parse_address<S: AsRef<str>>(
    row: &Row<'_, S>,
    address_type: AddressType,
    start: usize,
) -> Result<Address, ParseError> {
    Ok(Address {
        address_type,
        street1: row.optional(start)?,
        street2: row.optional(start + 1)?,
        city: row.optional(start + 2)?,
        state: row.optional(start + 3)?,
        zipcode: row.optional(start + 4)?,
        country: row.optional(start + 5)?,
        phone_number: row.optional(start + 6)?,
        fax_number: row.optional(start + 7)?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A full-width row of blank cells with the given overrides
    pub(crate) fn make_row(cells: &[(usize, &str)]) -> Vec<String> {
        let mut row = vec![String::new(); ROW_LEN];
        for (index, value) in cells {
            row[*index] = value.to_string();
        }
        row
    }

    fn parser() -> RowParser {
        RowParser::new().expect("parser")
    }

    #[test]
    fn test_npi_is_first_column_verbatim() {
        let row = make_row(&[(0, " 1234567893"), (2, "1111111111")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.npi.npi, " 1234567893");
        assert_eq!(record.npi.replacement_npi.as_deref(), Some("1111111111"));
        assert_eq!(record.npi.deactivation_date, None);
    }

    #[test]
    fn test_truncate_zipcode() {
        let parser = parser();
        assert_eq!(parser.truncate_zipcode("12345-6789"), "12345");
        assert_eq!(parser.truncate_zipcode("902101234"), "90210");
        assert_eq!(parser.truncate_zipcode("abc"), "");
        assert_eq!(parser.truncate_zipcode("1234"), "");
        assert_eq!(parser.truncate_zipcode(" 12345"), "");
        assert_eq!(parser.truncate_zipcode(""), "");
    }

    #[test]
    fn test_blank_names_are_dropped() {
        let row = make_row(&[(0, "1"), (5, "DOE"), (6, "JANE")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.names.len(), 1);
        assert_eq!(record.names[0].name_type, NameType::Primary);
        assert_eq!(record.names[0].first_name.as_deref(), Some("JANE"));
    }

    #[test]
    fn test_name_with_only_later_field_set_is_kept() {
        // secondary name: last name blank, suffix set
        let row = make_row(&[(0, "1"), (17, "JR")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.names.len(), 1);
        assert_eq!(record.names[0].name_type, NameType::Secondary);
        assert_eq!(record.names[0].suffix.as_deref(), Some("JR"));
    }

    #[test]
    fn test_address_with_only_fax_is_kept() {
        let row = make_row(&[(0, "1"), (27, "5551234")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.addresses.len(), 1);
        assert_eq!(record.addresses[0].address_type, AddressType::Mailing);
        assert_eq!(record.addresses[0].zipcode, None);
    }

    #[test]
    fn test_address_zipcode_truncated_after_elision() {
        let row = make_row(&[
            (0, "1"),
            (28, "1 MAIN ST"),
            (30, "BEVERLY HILLS"),
            (31, "CA"),
            (32, "902101234"),
        ]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.addresses.len(), 1);
        let address = &record.addresses[0];
        assert_eq!(address.address_type, AddressType::PracticeLocation);
        assert_eq!(address.zipcode.as_deref(), Some("90210"));
        assert_eq!(address.state.as_deref(), Some("CA"));
    }

    #[test]
    fn test_unparseable_zipcode_is_cleared() {
        let row = make_row(&[(0, "1"), (20, "PO BOX 1"), (24, "N/A")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.addresses.len(), 1);
        assert_eq!(record.addresses[0].zipcode, None);
        assert_eq!(record.addresses[0].street1.as_deref(), Some("PO BOX 1"));
    }

    #[test]
    fn test_licenses_skip_blank_groups() {
        let row = make_row(&[
            (0, "1"),
            (48, "207Q00000X"),
            (49, "A1"),
            (50, "CA"),
            (51, "Y"),
            // second group blank, third group has only a state
            (58, "NY"),
        ]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.licenses.len(), 2);
        assert_eq!(record.licenses[0].number.as_deref(), Some("A1"));
        assert_eq!(record.licenses[1].taxonomy_code, None);
        assert_eq!(record.licenses[1].state.as_deref(), Some("NY"));
    }

    #[test]
    fn test_identifiers_use_three_column_groups() {
        let row = make_row(&[(0, "1"), (107, "05"), (108, "TX"), (109, "MEDICAID"), (113, "01")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.identifiers.len(), 2);
        assert_eq!(record.identifiers[0].issuer.as_deref(), Some("MEDICAID"));
        assert_eq!(record.identifiers[1].type_code.as_deref(), Some("01"));
        assert_eq!(record.identifiers[1].state, None);
    }

    #[test]
    fn test_normalize_chunks_counts_non_blank_groups() {
        let data = ["a", "", "", "", "", "", "", "", "x", "", "", "y"];
        let licenses: Vec<License> = normalize_chunks(&data);
        assert_eq!(licenses.len(), 2);
        assert_eq!(licenses[0].taxonomy_code.as_deref(), Some("a"));
        assert_eq!(licenses[1].taxonomy_code.as_deref(), Some("x"));
        assert_eq!(licenses[1].taxonomy_switch.as_deref(), Some("y"));

        let identifiers: Vec<OtherIdentifier> = normalize_chunks(&data);
        assert_eq!(identifiers.len(), 3);
    }

    #[test]
    fn test_taxonomy_groups_keep_order() {
        let row = make_row(&[(0, "1"), (314, "193200000X"), (316, "193400000X")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.taxonomy_groups, vec!["193200000X", "193400000X"]);
    }

    #[test]
    fn test_whitespace_cells_are_values() {
        let row = make_row(&[(0, "1"), (13, " "), (314, " ")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.names.len(), 1);
        assert_eq!(record.names[0].name_type, NameType::Secondary);
        assert_eq!(record.names[0].last_name.as_deref(), Some(" "));
        assert_eq!(record.taxonomy_groups, vec![" "]);
    }

    #[test]
    fn test_whitespace_license_group_is_kept() {
        let row = make_row(&[(0, "1"), (49, "  ")]);
        let record = parser().parse(&row).unwrap();

        assert_eq!(record.licenses.len(), 1);
        assert_eq!(record.licenses[0].number.as_deref(), Some("  "));
    }

    #[test]
    fn test_row_with_cut_taxonomy_groups_parses() {
        let mut row = make_row(&[(0, "1"), (314, "193200000X")]);
        row.truncate(320);
        let record = parser().parse(&row).unwrap();
        assert_eq!(record.taxonomy_groups, vec!["193200000X"]);

        row.truncate(MIN_ROW_LEN);
        let record = parser().parse(&row).unwrap();
        assert!(record.taxonomy_groups.is_empty());

        row.truncate(MIN_ROW_LEN - 1);
        let err = parser().parse(&row).unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn { index: 313, .. }));
    }

    #[test]
    fn test_short_row_fails() {
        let row = vec!["1234567893".to_string(); 40];
        let err = parser().parse(&row).unwrap_err();

        assert!(matches!(err, ParseError::MissingColumn { len: 40, .. }));
    }

    #[test]
    fn test_empty_row_fails_on_npi() {
        let row: Vec<String> = Vec::new();
        let err = parser().parse(&row).unwrap_err();

        assert!(matches!(err, ParseError::MissingColumn { index: 0, len: 0 }));
    }
}
