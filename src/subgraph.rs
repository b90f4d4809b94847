//! Provider Subgraph Builder
//!
//! Turns parsed records into one write batch and submits it. Per record the
//! provider node is queued first; every dependent node hangs off the
//! provider's batch position. Zipcode, city and state nodes are shared
//! through get-or-create indexes, and the relationships to them are made
//! unique through composite keys.

use crate::batch::{to_properties, BatchPosition, CompositeKey, Properties, WriteBatch};
use crate::error::{BatchError, StoreError};
use crate::record::{Address, License, OtherIdentifier, ParsedRecord};
use crate::row_parser::is_blank;
use crate::schema::{
    EntityGroup, StateCodeMatcher, ADDRESS_LABEL, CITIES, HAS_ADDRESS, HAS_NAME, HAS_NPI, IN_CITY,
    IN_STATE, IN_ZIPCODE, NAME_LABEL, NPI_LABEL, PROVIDERS, STATES, ZIPCODES,
};
use crate::store::{GraphStore, OperationResult};
use serde::Serialize;
use tracing::{debug, info};

/// Counts reported after a submit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitSummary {
    pub records: usize,
    pub operations: usize,
    pub results: Vec<OperationResult>,
}

pub struct SubgraphBatchBuilder<S> {
    store: S,
    states: StateCodeMatcher,
}

impl<S: GraphStore> SubgraphBatchBuilder<S> {
    pub fn new(store: S) -> Result<Self, regex::Error> {
        Ok(Self {
            store,
            states: StateCodeMatcher::new()?,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Queue the subgraphs of all records into a fresh batch
    pub fn build(&self, records: &[ParsedRecord]) -> Result<WriteBatch, BatchError> {
        let mut batch = WriteBatch::new();
        for record in records {
            self.add_provider_subgraph(&mut batch, record)?;
        }
        Ok(batch)
    }

    /// Build one batch for `records` and submit it as a single atomic
    /// request. An empty record list submits nothing.
    pub async fn build_and_submit(
        &self,
        records: &[ParsedRecord],
    ) -> Result<SubmitSummary, StoreError> {
        if records.is_empty() {
            return Ok(SubmitSummary::default());
        }

        let batch = self.build(records)?;
        info!(
            "🔗 Built batch: {} records, {} operations",
            records.len(),
            batch.len()
        );

        let results = self.store.submit(&batch).await?;
        Ok(SubmitSummary {
            records: records.len(),
            operations: batch.len(),
            results,
        })
    }

    fn add_provider_subgraph(
        &self,
        batch: &mut WriteBatch,
        record: &ParsedRecord,
    ) -> Result<(), BatchError> {
        let npi = record.npi.npi.as_str();

        let mut provider_properties = to_properties(&record.provider)?;
        if !record.taxonomy_groups.is_empty() {
            provider_properties.insert(
                "taxonomy_groups".to_string(),
                record.taxonomy_groups.join(","),
            );
        }
        let provider = batch.create_indexed_node_or_fail(&PROVIDERS, npi, provider_properties);

        let npi_node = batch.create_node(NPI_LABEL, to_properties(&record.npi)?);
        batch.create_relationship(provider, HAS_NPI, npi_node)?;

        for name in &record.names {
            let name_node = batch.create_node(NAME_LABEL, to_properties(name)?);
            batch.create_relationship(provider, HAS_NAME, name_node)?;
        }

        for address in &record.addresses {
            self.add_address(batch, npi, provider, address)?;
        }

        self.add_entity_group(
            batch,
            npi,
            provider,
            EntityGroup::License,
            &record.licenses,
            |l: &License| l.state.as_deref(),
        )?;
        self.add_entity_group(
            batch,
            npi,
            provider,
            EntityGroup::Identifier,
            &record.identifiers,
            |i: &OtherIdentifier| i.state.as_deref(),
        )?;

        if let Some(last) = batch.cursor() {
            debug!("Queued subgraph for NPI {} at {}..={}", npi, provider, last);
        }
        Ok(())
    }

    fn add_address(
        &self,
        batch: &mut WriteBatch,
        npi: &str,
        provider: BatchPosition,
        address: &Address,
    ) -> Result<(), BatchError> {
        let address_node = batch.create_node(ADDRESS_LABEL, to_properties(address)?);
        batch.create_relationship(provider, HAS_ADDRESS, address_node)?;

        if let Some(zipcode) = address.zipcode.as_deref().filter(|z| !z.is_empty()) {
            let zipcode_node =
                batch.get_or_create_indexed_node(&ZIPCODES, zipcode, Properties::new());
            let key = CompositeKey::address(npi, address.address_type, zipcode);
            batch.get_or_create_unique_relationship(
                IN_ZIPCODE,
                &key,
                address_node,
                IN_ZIPCODE,
                zipcode_node,
            )?;
        }

        let city = address.city.as_deref().filter(|c| !is_blank(c));
        let state = address.state.as_deref().filter(|s| self.states.is_valid(s));
        if let (Some(city), Some(state)) = (city, state) {
            let city_name = format!("{}, {}", city, state);
            let mut city_properties = Properties::new();
            city_properties.insert("city".to_string(), city.to_string());
            city_properties.insert("state".to_string(), state.to_string());
            let city_node = batch.get_or_create_indexed_node(&CITIES, city_name.as_str(), city_properties);

            let key = CompositeKey::address(npi, address.address_type, &city_name);
            batch.get_or_create_unique_relationship(IN_CITY, &key, address_node, IN_CITY, city_node)?;

            let state_node = batch.get_or_create_indexed_node(&STATES, state, Properties::new());
            // own index: sharing in_city's entry would hand back the address relationship
            batch.get_or_create_unique_relationship(IN_STATE, &key, city_node, IN_STATE, state_node)?;
        }

        Ok(())
    }

    fn add_entity_group<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        npi: &str,
        provider: BatchPosition,
        group: EntityGroup,
        entities: &[T],
        state_of: impl Fn(&T) -> Option<&str>,
    ) -> Result<(), BatchError> {
        let has_relationship = group.has_relationship();
        let state_relationship = group.state_relationship();

        for (i, entity) in entities.iter().enumerate() {
            let node = batch.create_node(group.label(), to_properties(entity)?);
            batch.create_relationship(provider, has_relationship.as_str(), node)?;

            if let Some(state) = state_of(entity).filter(|s| self.states.is_valid(s)) {
                let state_node = batch.get_or_create_indexed_node(&STATES, state, Properties::new());
                let key = CompositeKey::entity(npi, group, i + 1);
                batch.get_or_create_unique_relationship(
                    &state_relationship,
                    &key,
                    node,
                    state_relationship.as_str(),
                    state_node,
                )?;
            }
        }
        Ok(())
    }
}
