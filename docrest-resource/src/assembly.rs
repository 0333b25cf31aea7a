//! Turns request parameters into store queries and result pages.

use bson::Uuid;
use tracing::{debug, warn};

use docrest_core::{
    document::Object,
    page::Page,
    query::{Query, Sort},
    store::DynDocumentStoreRef,
};

use crate::{
    error::{ResourceResult, ValidationError},
    field::trailing_segment,
    request::{LIMIT_PARAM, ORDER_BY_PARAM, Params, RequestContext, SKIP_PARAM, split_list},
    resource::ResourceSpec,
};

/// The rows of a result a list request asks for. `limit` is `None` when the
/// resource is not paginated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: usize,
    pub limit: Option<usize>,
}

fn parse_int(params: &Params, name: &str) -> ResourceResult<Option<i64>> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            ValidationError::message(format!("{name} must be an integer (got \"{raw}\" instead).")).into()
        }),
    }
}

fn non_negative(params: &Params, name: &str, value: i64) -> ResourceResult<usize> {
    usize::try_from(value).map_err(|_| {
        let raw = params.get(name).unwrap_or_default();
        ValidationError::message(format!("{name} must be a non-negative integer (got \"{raw}\" instead).")).into()
    })
}

impl ResourceSpec {
    /// Sort keys requested by `_order_by`. A `-` prefix sorts descending.
    ///
    /// Returns `None`, meaning no ordering, unless every listed field is allowed.
    pub fn ordering(&self, params: &Params) -> Option<Vec<Sort>> {
        let raw = params.get(ORDER_BY_PARAM)?;

        let mut sort = Vec::new();
        for key in split_list(raw) {
            let (name, descending) = match key.strip_prefix('-') {
                Some(name) => (name, true),
                None => (key, false),
            };
            if !self.allowed_ordering.iter().any(|allowed| allowed == name) {
                debug!(resource = %self.name, order_by = raw, "ignoring ordering");
                return None;
            }

            let field = self.renames.internal(name).to_string();
            sort.push(if descending { Sort::desc(field) } else { Sort::asc(field) });
        }

        (!sort.is_empty()).then_some(sort)
    }

    /// Validates `_skip` and `_limit` against the pagination policy.
    pub fn skip_and_limit(&self, params: &Params) -> ResourceResult<Window> {
        if !self.pagination.enabled {
            return Ok(Window { skip: 0, limit: None });
        }

        let max_limit = self.pagination.max_limit;
        let limit = parse_int(params, LIMIT_PARAM)?;
        let skip = parse_int(params, SKIP_PARAM)?;

        let limit = match limit {
            Some(limit) => match non_negative(params, LIMIT_PARAM, limit)? {
                limit if limit > max_limit => {
                    return Err(ValidationError::message(format!(
                        "The limit you set is larger than the maximum limit for this resource (max_limit = {max_limit})."
                    ))
                    .into());
                }
                limit => limit,
            },
            None => self.pagination.default_limit,
        };
        let skip = match skip {
            Some(skip) => non_negative(params, SKIP_PARAM, skip)?,
            None => 0,
        };

        Ok(Window {
            skip,
            limit: Some(limit.min(max_limit)),
        })
    }

    /// Runs the request's list query.
    ///
    /// Paginated requests fetch one row past the limit to find out whether more
    /// rows exist. The count always covers every match, independent of the window.
    pub async fn get_objects(&self, store: DynDocumentStoreRef<'_>, ctx: &RequestContext) -> ResourceResult<Page<Object>> {
        self.fetch_objects(store, ctx.params(), ctx.is_bulk()).await
    }

    pub(crate) async fn fetch_objects(
        &self,
        store: DynDocumentStoreRef<'_>,
        params: &Params,
        bulk: bool,
    ) -> ResourceResult<Page<Object>> {
        let mut filter = self.compile_filters(params)?;
        if let Some(type_filter) = self.schema.type_filter() {
            filter = filter.and(type_filter);
        }

        let cap = self.pagination.bulk_update_limit;
        let window = if bulk {
            Window { skip: 0, limit: Some(cap) }
        } else {
            self.skip_and_limit(params)?
        };

        let mut query = Query::builder()
            .filter(filter.clone())
            .sorts(self.ordering(params).unwrap_or_default());
        query = match window.limit {
            Some(limit) if bulk => query.limit(limit),
            Some(limit) => query.offset(window.skip).limit(limit + 1),
            None => query,
        };

        let collection = store.collection(self.schema.collection());
        let count = collection
            .count((!filter.is_always()).then_some(filter))
            .await?;
        let mut objects = collection.find(query.build()).await?;

        if bulk && objects.len() >= cap {
            warn!(resource = %self.name, matched = objects.len(), cap, "refusing bulk update");
            return Err(ValidationError::errors([format!(
                "It's not allowed to update more than {cap} objects at once"
            )])
            .into());
        }

        let has_more = match window.limit {
            Some(limit) if !bulk => {
                let more = objects.len() > limit;
                objects.truncate(limit);
                Some(more)
            }
            _ => None,
        };

        Ok(Page::builder(objects)
            .with_count(count)
            .with_has_more(has_more)
            .build())
    }

    /// Loads one object by id, or by URI for resources with a URI prefix.
    /// Ids that do not parse, and objects of another type, are not found.
    pub async fn get_object(&self, store: DynDocumentStoreRef<'_>, id: &str) -> ResourceResult<Option<Object>> {
        let id = if self.uri_prefix.is_some() { trailing_segment(id) } else { id };
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        Ok(store
            .collection(self.schema.collection())
            .find_one(id)
            .await?
            .filter(|object| self.schema.matches_type(object.doc_type())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PaginationPolicy,
        field::{DocumentSchema, ScalarType},
        operator::Operator,
        request::Method,
    };
    use bson::{Bson, doc};
    use docrest_core::store::{AsDynDocumentStore, DocumentStore};
    use docrest_memory::InMemoryStore;
    use proptest::prelude::*;

    fn schema() -> DocumentSchema {
        DocumentSchema::builder("User", "users")
            .scalar("nick", ScalarType::String)
            .scalar("age", ScalarType::Int)
            .build()
    }

    fn spec(pagination: PaginationPolicy) -> ResourceSpec {
        ResourceSpec::builder("users", schema())
            .rename("age", "years")
            .filter("nick", [Operator::exact(), Operator::ne()])
            .allowed_ordering(["nick", "years"])
            .pagination(pagination)
            .build()
            .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().copied().collect()
    }

    async fn seeded(count: usize) -> DocumentStore<InMemoryStore> {
        let store = DocumentStore::new(InMemoryStore::new());
        let collection = store.collection("users");
        for i in 0..count {
            let mut object = Object::from_fields("User", doc! { "nick": format!("user{i:03}"), "age": i as i32 });
            collection.commit(&mut object).await.unwrap();
        }
        store
    }

    fn error_message(result: ResourceResult<Window>) -> String {
        result.unwrap_err().as_validation().unwrap().error.clone().unwrap()
    }

    #[test]
    fn limit_above_max_is_rejected() {
        let spec = spec(PaginationPolicy::default());
        assert_eq!(
            error_message(spec.skip_and_limit(&params(&[("_limit", "10000")]))),
            "The limit you set is larger than the maximum limit for this resource (max_limit = 100).",
        );
    }

    #[test]
    fn unbounded_max_limit_accepts_any_limit() {
        let spec = spec(PaginationPolicy { max_limit: usize::MAX, ..PaginationPolicy::default() });
        assert_eq!(
            spec.skip_and_limit(&params(&[("_limit", "5")])).unwrap(),
            Window { skip: 0, limit: Some(5) },
        );
    }

    #[test]
    fn pagination_params_must_be_non_negative_integers() {
        let spec = spec(PaginationPolicy::default());
        assert_eq!(
            error_message(spec.skip_and_limit(&params(&[("_limit", "ten")]))),
            "_limit must be an integer (got \"ten\" instead).",
        );
        assert_eq!(
            error_message(spec.skip_and_limit(&params(&[("_skip", "1.5")]))),
            "_skip must be an integer (got \"1.5\" instead).",
        );
        assert_eq!(
            error_message(spec.skip_and_limit(&params(&[("_skip", "-1")]))),
            "_skip must be a non-negative integer (got \"-1\" instead).",
        );
        assert_eq!(
            spec.skip_and_limit(&params(&[("_skip", "5")])).unwrap(),
            Window { skip: 5, limit: Some(100) },
        );
    }

    #[test]
    fn unpaginated_resources_ignore_window_params() {
        let spec = spec(PaginationPolicy::disabled());
        assert_eq!(
            spec.skip_and_limit(&params(&[("_limit", "nope"), ("_skip", "3")])).unwrap(),
            Window { skip: 0, limit: None },
        );
    }

    #[test]
    fn ordering_requires_every_field_allowed() {
        let spec = spec(PaginationPolicy::default());
        assert_eq!(
            spec.ordering(&params(&[("_order_by", "-years,nick")])),
            Some(vec![Sort::desc("age"), Sort::asc("nick")]),
        );
        assert_eq!(spec.ordering(&params(&[("_order_by", "nick,email")])), None);
        assert_eq!(spec.ordering(&params(&[])), None);
    }

    #[tokio::test]
    async fn has_more_flag_and_total_count() {
        let store = seeded(5).await;
        let spec = spec(PaginationPolicy::default());
        let ctx = RequestContext::builder(Method::List)
            .query([("_limit", "2"), ("_skip", "1"), ("_order_by", "nick"), ("nick__ne", "user004")])
            .build()
            .unwrap();

        let page = spec.get_objects(store.as_dyn(), &ctx).await.unwrap();
        let nicks: Vec<_> = page.items.iter().map(|o| o.get("nick").cloned().unwrap()).collect();
        assert_eq!(nicks, vec![Bson::from("user001"), Bson::from("user002")]);
        assert_eq!(page.has_more, Some(true));
        assert_eq!(page.count, 4);
    }

    #[tokio::test]
    async fn bulk_mode_refuses_at_cap() {
        let store = seeded(3).await;
        let spec = spec(PaginationPolicy { bulk_update_limit: 3, ..PaginationPolicy::default() });
        let ctx = RequestContext::builder(Method::BulkUpdate)
            .body("{}")
            .build()
            .unwrap();

        let err = spec.get_objects(store.as_dyn(), &ctx).await.unwrap_err();
        assert_eq!(
            err.as_validation().unwrap().errors,
            vec!["It's not allowed to update more than 3 objects at once"],
        );
    }

    #[tokio::test]
    async fn get_object_ignores_malformed_ids() {
        let store = seeded(1).await;
        let spec = spec(PaginationPolicy::default());
        let stored = spec
            .get_objects(store.as_dyn(), &RequestContext::builder(Method::List).build().unwrap())
            .await
            .unwrap();
        let id = stored.items[0].id().to_string();

        assert!(spec.get_object(store.as_dyn(), &id).await.unwrap().is_some());
        assert!(spec.get_object(store.as_dyn(), "not-an-id").await.unwrap().is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn page_is_bounded_and_has_more_iff_rows_remain(rows in 0usize..12, limit in 0usize..8, skip in 0usize..12) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let page = runtime.block_on(async {
                let store = seeded(rows).await;
                let ctx = RequestContext::builder(Method::List)
                    .query([("_limit", limit.to_string()), ("_skip", skip.to_string())])
                    .build()
                    .unwrap();
                spec(PaginationPolicy::default()).get_objects(store.as_dyn(), &ctx).await.unwrap()
            });

            prop_assert!(page.items.len() <= limit);
            prop_assert_eq!(page.has_more, Some(rows.saturating_sub(skip) > limit));
            prop_assert_eq!(page.count, rows);
        }
    }
}
