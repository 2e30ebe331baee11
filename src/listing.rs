use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::composer::{JoinStrategy, QueryComposer, Statement};
use crate::error::{ServiceError, StoreError};
use crate::filter::FilterSpec;
use crate::models::{Broker, Candidate, CandidatePage, Status};
use crate::registry::{Row, StoreRegistry};

/// Label shown for a broker id that has no row in the foundation store.
pub const UNKNOWN_BROKER: &str = "Unknown";

pub struct ListingService {
    registry: Arc<StoreRegistry>,
    composer: QueryComposer,
}

impl ListingService {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        let composer = QueryComposer::for_registry(&registry);
        Self { registry, composer }
    }

    pub fn with_composer(registry: Arc<StoreRegistry>, composer: QueryComposer) -> Self {
        Self { registry, composer }
    }

    pub fn list(&self, spec: &FilterSpec) -> Result<CandidatePage, ServiceError> {
        let page = self.composer.build(spec);
        let items = self.load_candidates(&page)?;

        let count = self.composer.build_count(spec);
        let rows = count.run(&self.registry)?;
        let total_count = match rows.first() {
            Some(row) => decode(&count, row.get::<i64>("total"))?,
            None => 0,
        };

        tracing::debug!(
            status = ?spec.status,
            page = spec.page,
            returned = items.len(),
            total_count,
            "listed candidates"
        );
        Ok(CandidatePage { items, total_count })
    }

    pub fn get(&self, id: i64) -> Result<Candidate, ServiceError> {
        let stmt = self.composer.build_detail(id);
        self.load_candidates(&stmt)?
            .into_iter()
            .next()
            .ok_or(ServiceError::NotFound(id))
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<Candidate>, ServiceError> {
        self.load_candidates(&self.composer.build_recent(limit))
    }

    pub fn broker_options(&self) -> Result<Vec<Broker>, ServiceError> {
        match self.composer.strategy() {
            JoinStrategy::CrossStore => {
                let stmt = self.composer.build_broker_options();
                let rows = stmt.run(&self.registry)?;
                Ok(rows
                    .iter()
                    .map(|row| decode(&stmt, row_to_broker(row)))
                    .collect::<Result<Vec<_>, _>>()?)
            }
            JoinStrategy::Split => {
                let used = self.composer.build_used_broker_ids();
                let ids = used
                    .run(&self.registry)?
                    .iter()
                    .map(|row| decode(&used, row.get::<i64>("broker_id")))
                    .collect::<Result<Vec<_>, _>>()?;
                let Some(lookup) = self.composer.build_broker_lookup(&ids) else {
                    return Ok(Vec::new());
                };
                let rows = lookup.run(&self.registry)?;
                Ok(rows
                    .iter()
                    .map(|row| decode(&lookup, row_to_broker(row)))
                    .collect::<Result<Vec<_>, _>>()?)
            }
        }
    }

    pub fn country_options(&self) -> Result<Vec<String>, ServiceError> {
        let stmt = self.composer.build_country_options();
        let rows = stmt.run(&self.registry)?;
        let countries = rows
            .iter()
            .map(|row| decode(&stmt, row.get::<String>("country_name")))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(countries.into_iter().collect())
    }

    fn load_candidates(&self, stmt: &Statement) -> Result<Vec<Candidate>, ServiceError> {
        let rows = stmt.run(&self.registry)?;
        let mut items = rows
            .iter()
            .map(|row| decode(stmt, row_to_candidate(row)))
            .collect::<Result<Vec<_>, _>>()?;

        if self.composer.strategy() == JoinStrategy::Split {
            let names = self.broker_names(&items)?;
            for item in &mut items {
                if let Some(id) = item.broker_id {
                    item.broker_name = names.get(&id).cloned();
                }
            }
        }
        for item in &mut items {
            if item.broker_id.is_some() && item.broker_name.is_none() {
                item.broker_name = Some(UNKNOWN_BROKER.to_string());
            }
        }
        Ok(items)
    }

    /// id -> name map from the foundation store for the brokers on this page.
    fn broker_names(&self, items: &[Candidate]) -> Result<HashMap<i64, String>, ServiceError> {
        let ids: Vec<i64> = items.iter().filter_map(|c| c.broker_id).collect();
        let Some(lookup) = self.composer.build_broker_lookup(&ids) else {
            return Ok(HashMap::new());
        };
        let rows = lookup.run(&self.registry)?;
        let brokers = rows
            .iter()
            .map(|row| decode(&lookup, row_to_broker(row)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(brokers.into_iter().map(|b| (b.id, b.name)).collect())
    }
}

fn decode<T>(stmt: &Statement, result: rusqlite::Result<T>) -> Result<T, ServiceError> {
    result.map_err(|e| ServiceError::from(StoreError::query(stmt.store, e)))
}

pub(crate) fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(Decimal::from_f64).map(|d| d.normalize())
}

fn row_to_candidate(row: &Row) -> rusqlite::Result<Candidate> {
    let status_fk: Option<i64> = row.get("new_companies_status_id")?;
    let status_label: Option<String> = row.get("status_label")?;
    let id: i64 = row.get("new_company_id")?;
    if status_fk.is_some() && status_label.is_none() {
        tracing::warn!(company_id = id, status_id = ?status_fk, "status id has no lookup row");
    }
    Ok(Candidate {
        id,
        name: row.get("company_name")?,
        country: row.get("country_name")?,
        comment: row.get("comments")?,
        yield_pct: to_decimal(row.get("yield")?),
        ticker: row.get("ticker")?,
        broker_id: row.get("broker_id")?,
        broker_name: row.get("broker_name")?,
        status: Status::from_foreign_key(status_fk),
    })
}

fn row_to_broker(row: &Row) -> rusqlite::Result<Broker> {
    Ok(Broker {
        id: row.get("broker_id")?,
        name: row.get("broker_name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RawFilterParams;
    use crate::registry::StoreId;
    use crate::schema::fixtures::*;

    const STRATEGIES: [bool; 2] = [true, false];

    fn parse(pairs: &[(&str, &str)]) -> FilterSpec {
        FilterSpec::parse(&RawFilterParams::from_pairs(pairs.iter().copied())).unwrap()
    }

    fn seed_pipeline(registry: &StoreRegistry) {
        add_broker(registry, 1, "Avanza");
        add_broker(registry, 2, "Nordnet");
        add_broker(registry, 3, "Interactive Brokers");
        for (name, country, broker) in [
            ("Atlas Copco", "Sweden", Some(1)),
            ("Novo Nordisk", "Denmark", Some(2)),
            ("Equinor", "Norway", None),
        ] {
            add_candidate(
                registry,
                NewCandidate {
                    country: Some(country),
                    broker_id: broker,
                    ..NewCandidate::named(name)
                },
            );
        }
        for name in ["Spotify Technology", "Volvo"] {
            add_candidate(
                registry,
                NewCandidate {
                    country: Some("Sweden"),
                    broker_id: Some(1),
                    status: Status::Approved,
                    ..NewCandidate::named(name)
                },
            );
        }
    }

    #[test]
    fn test_default_listing_returns_only_pending() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            seed_pipeline(&stores.registry);
            let service = ListingService::new(Arc::clone(&stores.registry));

            let page = service.list(&parse(&[])).unwrap();
            assert_eq!(page.total_count, 3);
            let names: Vec<&str> = page.items.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(names, vec!["Atlas Copco", "Equinor", "Novo Nordisk"]);
            assert!(page.items.iter().all(|c| c.status == Status::Pending));
        }
    }

    #[test]
    fn test_search_with_all_statuses() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            seed_pipeline(&stores.registry);
            let service = ListingService::new(Arc::clone(&stores.registry));

            let page = service.list(&parse(&[("status", "all"), ("search", "spotify")])).unwrap();
            assert_eq!(page.total_count, 1);
            assert_eq!(page.items.len(), 1);
            assert_eq!(page.items[0].name, "Spotify Technology");
            assert_eq!(page.items[0].status, Status::Approved);
            assert_eq!(page.items[0].broker_name.as_deref(), Some("Avanza"));
        }
    }

    #[test]
    fn test_search_matches_comment_and_country() {
        let stores = stores(true);
        add_candidate(
            &stores.registry,
            NewCandidate {
                comment: Some("strong dividend history"),
                ..NewCandidate::named("Alpha")
            },
        );
        add_candidate(
            &stores.registry,
            NewCandidate {
                country: Some("Finland"),
                ..NewCandidate::named("Beta")
            },
        );
        add_candidate(&stores.registry, NewCandidate::named("100% Owned"));
        let service = ListingService::new(Arc::clone(&stores.registry));

        let by_comment = service.list(&parse(&[("search", "DIVIDEND")])).unwrap();
        assert_eq!(by_comment.items[0].name, "Alpha");
        let by_country = service.list(&parse(&[("search", "finl")])).unwrap();
        assert_eq!(by_country.items[0].name, "Beta");
        let literal_percent = service.list(&parse(&[("search", "0%")])).unwrap();
        assert_eq!(literal_percent.total_count, 1);
        assert_eq!(literal_percent.items[0].name, "100% Owned");
    }

    #[test]
    fn test_total_count_is_stable_across_pages() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            for i in 0..7 {
                add_candidate(&stores.registry, NewCandidate::named(&format!("Company {}", i)));
            }
            let service = ListingService::new(Arc::clone(&stores.registry));

            let first = service.list(&parse(&[("pageSize", "3"), ("page", "1")])).unwrap();
            let second = service.list(&parse(&[("pageSize", "3"), ("page", "2")])).unwrap();
            let last = service.list(&parse(&[("pageSize", "3"), ("page", "3")])).unwrap();
            let beyond = service.list(&parse(&[("pageSize", "3"), ("page", "9")])).unwrap();
            assert_eq!(first.total_count, 7);
            assert_eq!(second.total_count, 7);
            assert_eq!(last.total_count, 7);
            assert_eq!(beyond.total_count, 7);
            assert_eq!(first.items.len(), 3);
            assert_eq!(last.items.len(), 1);
            assert!(beyond.items.is_empty());
            assert_eq!(second.items[0].name, "Company 3");
        }
    }

    #[test]
    fn test_broker_and_country_filters() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            seed_pipeline(&stores.registry);
            let service = ListingService::new(Arc::clone(&stores.registry));

            let page = service.list(&parse(&[("status", "all"), ("brokerId", "1")])).unwrap();
            assert_eq!(page.total_count, 3);
            let page = service
                .list(&parse(&[("status", "all"), ("brokerId", "1"), ("country", "Sweden")]))
                .unwrap();
            assert_eq!(page.total_count, 3);
            let page = service.list(&parse(&[("country", "Sweden")])).unwrap();
            assert_eq!(page.total_count, 1);
            assert_eq!(page.items[0].name, "Atlas Copco");
        }
    }

    #[test]
    fn test_missing_broker_is_labelled_unknown() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            let id = add_candidate(
                &stores.registry,
                NewCandidate {
                    broker_id: Some(99),
                    ..NewCandidate::named("Orphan")
                },
            );
            add_candidate(&stores.registry, NewCandidate::named("No Broker"));
            let service = ListingService::new(Arc::clone(&stores.registry));

            let orphan = service.get(id).unwrap();
            assert_eq!(orphan.broker_name.as_deref(), Some(UNKNOWN_BROKER));
            let page = service.list(&parse(&[("search", "No Broker")])).unwrap();
            assert_eq!(page.items[0].broker_name, None);
        }
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let stores = stores(true);
        let service = ListingService::new(Arc::clone(&stores.registry));
        assert!(matches!(service.get(999), Err(ServiceError::NotFound(999))));
    }

    #[test]
    fn test_unused_broker_is_not_a_filter_option() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            seed_pipeline(&stores.registry);
            let service = ListingService::new(Arc::clone(&stores.registry));

            let brokers = service.broker_options().unwrap();
            assert_eq!(
                brokers,
                vec![
                    Broker { id: 1, name: "Avanza".to_string() },
                    Broker { id: 2, name: "Nordnet".to_string() },
                ]
            );
        }
    }

    #[test]
    fn test_country_options_are_distinct_and_sorted() {
        let stores = stores(false);
        seed_pipeline(&stores.registry);
        add_candidate(
            &stores.registry,
            NewCandidate {
                country: Some("  "),
                ..NewCandidate::named("Blank Country")
            },
        );
        let service = ListingService::new(Arc::clone(&stores.registry));
        assert_eq!(service.country_options().unwrap(), vec!["Denmark", "Norway", "Sweden"]);
    }

    #[test]
    fn test_every_country_option_filters_back_to_its_rows() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            let seeded = [("Padded", " Sweden"), ("Plain", "Sweden"), ("Fjord", "Norway ")];
            for (name, country) in seeded {
                add_candidate(
                    &stores.registry,
                    NewCandidate {
                        country: Some(country),
                        ..NewCandidate::named(name)
                    },
                );
            }
            let service = ListingService::new(Arc::clone(&stores.registry));

            let options = service.country_options().unwrap();
            assert_eq!(options, vec!["Norway", "Sweden"]);
            for option in &options {
                let page = service
                    .list(&parse(&[("status", "all"), ("country", option.as_str())]))
                    .unwrap();
                let mut listed: Vec<&str> = page.items.iter().map(|c| c.name.as_str()).collect();
                listed.sort_unstable();
                let mut expected: Vec<&str> = seeded
                    .iter()
                    .filter(|(_, country)| country.trim() == option)
                    .map(|(name, _)| *name)
                    .collect();
                expected.sort_unstable();
                assert_eq!(listed, expected);
                assert_eq!(page.total_count, expected.len() as i64);
            }
        }
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            add_candidate(
                &stores.registry,
                NewCandidate {
                    country: Some("Danmark"),
                    ..NewCandidate::named("Ørsted")
                },
            );
            add_candidate(
                &stores.registry,
                NewCandidate {
                    comment: Some("listed in MALMÖ"),
                    ..NewCandidate::named("Skåne Holding")
                },
            );
            let service = ListingService::new(Arc::clone(&stores.registry));

            let page = service.list(&parse(&[("search", "ørsted")])).unwrap();
            assert_eq!(page.total_count, 1);
            assert_eq!(page.items[0].name, "Ørsted");
            let page = service.list(&parse(&[("search", "SKÅNE")])).unwrap();
            assert_eq!(page.items[0].name, "Skåne Holding");
            let page = service.list(&parse(&[("search", "malmö")])).unwrap();
            assert_eq!(page.total_count, 1);
        }
    }

    #[test]
    fn test_yield_is_decoded_as_decimal() {
        let stores = stores(true);
        let id = add_candidate(
            &stores.registry,
            NewCandidate {
                yield_pct: Some(3.25),
                ..NewCandidate::named("Yielder")
            },
        );
        let service = ListingService::new(Arc::clone(&stores.registry));
        assert_eq!(service.get(id).unwrap().yield_pct, Some(Decimal::new(325, 2)));
    }

    #[test]
    fn test_store_failure_is_service_unavailable() {
        let stores = stores(true);
        let service = ListingService::new(Arc::clone(&stores.registry));
        stores.registry.shutdown();
        assert!(matches!(
            service.list(&FilterSpec::default()),
            Err(ServiceError::ServiceUnavailable)
        ));
        assert!(matches!(service.broker_options(), Err(ServiceError::ServiceUnavailable)));
    }

    #[test]
    fn test_query_failure_is_service_unavailable() {
        for cross in STRATEGIES {
            let stores = stores(cross);
            seed_pipeline(&stores.registry);
            stores
                .registry
                .execute_batch(StoreId::Portfolio, "DROP TABLE new_companies;")
                .unwrap();
            let service = ListingService::new(Arc::clone(&stores.registry));

            let err = service.list(&FilterSpec::default()).unwrap_err();
            assert!(matches!(err, ServiceError::ServiceUnavailable));
            let message = err.to_string();
            assert_eq!(message, "Service temporarily unavailable");
            assert!(!message.contains("no such table"));
            assert!(matches!(service.country_options(), Err(ServiceError::ServiceUnavailable)));
        }
    }
}
