//! Search requests against the professor store: parameter normalization,
//! filtering, sorting and fixed-size paging.

use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::db::{self, Filter, SortDirection, SortField};
use crate::model::ProfessorRecord;

pub const PAGE_SIZE: usize = 20;

/// Raw request parameters as they arrive from a query string. Every field is
/// optional and free-form; [`SearchRequest::from_params`] turns them into a
/// valid request without ever rejecting one.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub search: Option<String>,
    /// Comma-separated research field tags.
    pub fields: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub page: Option<String>,
    /// Presentation only, passed through untouched.
    pub theme: Option<String>,
}

impl SearchParams {
    /// Build from raw query pairs. A key given more than once keeps its first
    /// value; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "search" => &mut params.search,
                "fields" => &mut params.fields,
                "sort_by" => &mut params.sort_by,
                "sort_dir" => &mut params.sort_dir,
                "page" => &mut params.page,
                "theme" => &mut params.theme,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub search_term: String,
    pub research_fields: Vec<String>,
    pub sort_by: SortField,
    pub sort_dir: SortDirection,
    pub page: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            research_fields: Vec::new(),
            sort_by: SortField::University,
            sort_dir: SortDirection::Asc,
            page: 1,
        }
    }
}

impl SearchRequest {
    pub fn from_params(params: &SearchParams) -> Self {
        let sort_by = params
            .sort_by
            .as_deref()
            .and_then(|s| SortField::parse(s.trim()))
            .unwrap_or(SortField::University);

        let sort_dir = match params.sort_dir.as_deref().map(str::trim) {
            None => SortDirection::Asc,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(_) => SortDirection::Desc,
        };

        let page = params
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .map_or(1, |p| usize::try_from(p).unwrap_or(usize::MAX));

        Self {
            search_term: params.search.as_deref().unwrap_or_default().trim().to_string(),
            research_fields: parse_field_list(params.fields.as_deref().unwrap_or_default()),
            sort_by,
            sort_dir,
            page,
        }
    }

    pub fn filter(&self) -> Filter<'_> {
        Filter {
            search_term: Some(self.search_term.as_str()).filter(|t| !t.is_empty()),
            research_fields: &self.research_fields,
        }
    }

    fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(PAGE_SIZE)
    }
}

/// Split a comma-separated tag list, trimming each tag and dropping empties.
pub fn parse_field_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}

pub fn total_pages(total_count: usize) -> usize {
    total_count.div_ceil(PAGE_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    pub records: Vec<ProfessorRecord>,
    pub page: usize,
    pub total_pages: usize,
    pub total_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("professor store is unavailable")]
    Unavailable,
    #[error("store query failed: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Answer one request. `store` is `None` when the backend could not be
/// reached; that is reported as [`SearchError::Unavailable`], never as an
/// empty page. Read-only.
pub fn search(store: Option<&Connection>, request: &SearchRequest) -> Result<SearchPage, SearchError> {
    let conn = store.ok_or(SearchError::Unavailable)?;
    let filter = request.filter();

    let total_count = db::count_matching(conn, &filter)?;
    let records = db::fetch_matching(
        conn,
        &filter,
        request.sort_by,
        request.sort_dir,
        request.offset(),
        PAGE_SIZE,
    )?;

    debug!(
        search = %request.search_term,
        fields = ?request.research_fields,
        sort_by = request.sort_by.as_str(),
        sort_dir = request.sort_dir.as_str(),
        page = request.page,
        total_count,
        returned = records.len(),
        "Search"
    );

    Ok(SearchPage {
        records,
        page: request.page,
        total_pages: total_pages(total_count),
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_db, prof};

    fn params(pairs: &[(&str, &str)]) -> SearchParams {
        SearchParams::from_pairs(pairs.iter().copied())
    }

    fn seeded(n: usize) -> Connection {
        let conn = memory_db();
        let rows: Vec<_> = (1..=n).map(|i| prof(i as u64, &format!("prof {i:03}"), &[])).collect();
        db::insert_professors(&conn, &rows).unwrap();
        conn
    }

    #[test]
    fn defaults() {
        let req = SearchRequest::from_params(&SearchParams::default());
        assert_eq!(req, SearchRequest::default());
        assert_eq!(req.sort_by, SortField::University);
        assert_eq!(req.sort_dir, SortDirection::Asc);
        assert_eq!(req.page, 1);
    }

    #[test]
    fn unknown_values_normalize() {
        let req = SearchRequest::from_params(&params(&[
            ("sort_by", "email"),
            ("sort_dir", "sideways"),
            ("page", "two"),
        ]));
        assert_eq!(req.sort_by, SortField::University);
        assert_eq!(req.sort_dir, SortDirection::Desc);
        assert_eq!(req.page, 1);

        let req = SearchRequest::from_params(&params(&[("page", "0")]));
        assert_eq!(req.page, 1);
        let req = SearchRequest::from_params(&params(&[("page", "-4")]));
        assert_eq!(req.page, 1);
    }

    #[test]
    fn recognized_values_kept() {
        let req = SearchRequest::from_params(&params(&[
            ("search", "  deep learning "),
            ("sort_by", "h_index"),
            ("sort_dir", "ASC"),
            ("page", "3"),
        ]));
        assert_eq!(req.search_term, "deep learning");
        assert_eq!(req.sort_by, SortField::HIndex);
        assert_eq!(req.sort_dir, SortDirection::Asc);
        assert_eq!(req.page, 3);
    }

    #[test]
    fn repeated_keys_keep_first_value() {
        let p = params(&[
            ("page", "2"),
            ("sort_by", "name"),
            ("page", "7"),
            ("sort_by", "major"),
            ("utm_source", "x"),
        ]);
        assert_eq!(p.page.as_deref(), Some("2"));
        assert_eq!(p.sort_by.as_deref(), Some("name"));
        let req = SearchRequest::from_params(&p);
        assert_eq!((req.page, req.sort_by), (2, SortField::Name));
    }

    #[test]
    fn field_list_splits_and_trims() {
        assert_eq!(parse_field_list(" AI , ,Networks,"), vec!["AI", "Networks"]);
        assert!(parse_field_list("").is_empty());
        assert!(parse_field_list(" , ").is_empty());
    }

    #[test]
    fn page_boundaries() {
        let conn = seeded(45);
        let mut req = SearchRequest::default();

        req.page = 1;
        let first = search(Some(&conn), &req).unwrap();
        assert_eq!(first.total_count, 45);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.records.len(), 20);

        req.page = 3;
        let last = search(Some(&conn), &req).unwrap();
        assert_eq!(last.records.len(), 5);

        req.page = 4;
        let past = search(Some(&conn), &req).unwrap();
        assert!(past.records.is_empty());
        assert_eq!(past.total_count, 45);
        assert_eq!(past.page, 4);
    }

    #[test]
    fn pages_do_not_overlap() {
        let conn = seeded(45);
        let mut req = SearchRequest::from_params(&params(&[("sort_by", "name")]));
        let mut seen = Vec::new();
        for page in 1..=3 {
            req.page = page;
            seen.extend(search(Some(&conn), &req).unwrap().records.into_iter().map(|r| r.id));
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 45);
    }

    #[test]
    fn huge_page_is_empty_not_error() {
        let conn = seeded(3);
        let req = SearchRequest::from_params(&params(&[("page", "99999999999999")]));
        let page = search(Some(&conn), &req).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn lowercase_term_matches_uppercase_field() {
        let conn = memory_db();
        db::insert_professors(&conn, &[prof(1, "Reza", &["AI"]), prof(2, "Nima", &["Databases"])])
            .unwrap();
        let req = SearchRequest::from_params(&params(&[("search", "ai")]));
        let page = search(Some(&conn), &req).unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.records[0].name, "Reza");
    }

    #[test]
    fn fields_param_filters_conjunctively() {
        let conn = memory_db();
        db::insert_professors(&conn, &[prof(1, "x", &["AI", "Networks"])]).unwrap();
        let hit = SearchRequest::from_params(&params(&[("fields", "AI, Networks")]));
        assert_eq!(search(Some(&conn), &hit).unwrap().total_count, 1);
        let miss = SearchRequest::from_params(&params(&[("fields", "AI,Security")]));
        assert_eq!(search(Some(&conn), &miss).unwrap().total_count, 0);
    }

    #[test]
    fn repeated_calls_agree() {
        let conn = seeded(30);
        let req = SearchRequest::from_params(&params(&[("sort_by", "name"), ("sort_dir", "desc")]));
        let a = search(Some(&conn), &req).unwrap();
        let b = search(Some(&conn), &req).unwrap();
        assert_eq!(a, b);
        assert_eq!(db::count_all(&conn).unwrap(), 30);
    }

    #[test]
    fn missing_store_is_unavailable() {
        let err = search(None, &SearchRequest::default()).unwrap_err();
        assert!(matches!(err, SearchError::Unavailable));
    }
}
