use professor_directory::db::{self, SortDirection, SortField};
use professor_directory::loader;
use professor_directory::merge::MergeTable;
use professor_directory::model::CardObservation;
use professor_directory::search::{self, SearchError, SearchParams, SearchRequest};

fn card(name: &str, university: &str, h_index: &str, fields: &[&str]) -> CardObservation {
    CardObservation {
        name: name.to_string(),
        university: university.to_string(),
        h_index: h_index.to_string(),
        research_fields: fields.iter().map(|f| f.to_string()).collect(),
        ..CardObservation::default()
    }
}

fn request(pairs: &[(&str, &str)]) -> SearchRequest {
    let mut params = SearchParams::default();
    for (key, value) in pairs {
        let value = Some(value.to_string());
        match *key {
            "search" => params.search = value,
            "fields" => params.fields = value,
            "sort_by" => params.sort_by = value,
            "sort_dir" => params.sort_dir = value,
            "page" => params.page = value,
            other => panic!("unknown parameter {other}"),
        }
    }
    SearchRequest::from_params(&params)
}

#[test]
fn collected_records_are_searchable_after_load() {
    let mut table = MergeTable::new();
    table.observe(card("Dr. X", "University of Tehran", "9", &["AI"]), "AI");
    table.observe(card("Dr. Y", "Sharif University", "", &["Networks"]), "Networks");
    table.observe(card(" Dr.  X ", "University of Tehran", "", &["AI", "Security"]), "Security");
    table.observe(card("Dr. Z", "Amirkabir University", "10", &["AI", "Vision"]), "AI");
    table.observe(card("", "Nowhere", "1", &[]), "AI");
    let records = table.finalize("2025-01-01T00:00:00Z");
    assert_eq!(records.len(), 3);

    let dir = tempfile::tempdir().unwrap();
    let jsonl = dir.path().join("professors.jsonl");
    loader::write_jsonl(&jsonl, &records).unwrap();

    let conn = db::connect(&dir.path().join("professors.sqlite")).unwrap();
    let report = loader::load_file(&conn, &jsonl).unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.skipped, 0);

    let x = search::search(Some(&conn), &request(&[("search", "dr. x")])).unwrap();
    assert_eq!(x.total_count, 1);
    assert_eq!(x.records[0].id, 1);
    assert_eq!(x.records[0].major, "AI, Security");
    assert_eq!(x.records[0].research_fields, vec!["AI", "Security"]);
    assert_eq!(x.records[0].h_index.as_deref(), Some("9"));

    let by_h = request(&[("fields", "AI"), ("sort_by", "h_index"), ("sort_dir", "desc")]);
    assert_eq!((by_h.sort_by, by_h.sort_dir), (SortField::HIndex, SortDirection::Desc));
    let ai = search::search(Some(&conn), &by_h).unwrap();
    let names: Vec<&str> = ai.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Dr. Z", "Dr. X"]);

    let none = search::search(Some(&conn), &request(&[("fields", "AI,Networks")])).unwrap();
    assert_eq!(none.total_count, 0);
    assert_eq!(none.total_pages, 0);
}

#[test]
fn reload_replaces_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let conn = db::connect(&dir.path().join("professors.sqlite")).unwrap();

    let first = dir.path().join("first.jsonl");
    std::fs::write(&first, "{\"id\":1,\"name\":\"Old\"}\n{\"id\":2,\"name\":\"Older\"}\n").unwrap();
    loader::load_file(&conn, &first).unwrap();

    let second = dir.path().join("second.jsonl");
    std::fs::write(
        &second,
        "{\"id\":9,\"name\":\"New\",\"research_fields\":\"AI, IR\"}\nnot json\n\n",
    )
    .unwrap();
    let report = loader::load_file(&conn, &second).unwrap();
    assert_eq!((report.inserted, report.skipped, report.blank), (1, 1, 1));

    assert_eq!(db::count_all(&conn).unwrap(), 1);
    let page = search::search(Some(&conn), &request(&[("fields", "IR")])).unwrap();
    assert_eq!(page.records[0].name, "New");
}

#[test]
fn renumbered_file_loads_with_dense_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edited.jsonl");
    std::fs::write(&path, "{\"id\":4,\"name\":\"A\"}\n{\"id\":4,\"name\":\"B\"}\n\n{\"name\":\"C\"}\n").unwrap();
    assert_eq!(loader::renumber_file(&path).unwrap(), 3);

    let conn = db::connect(&dir.path().join("professors.sqlite")).unwrap();
    loader::load_file(&conn, &path).unwrap();
    let page = search::search(Some(&conn), &request(&[("sort_by", "name")])).unwrap();
    let ids: Vec<u64> = page.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn unavailable_store_is_not_an_empty_page() {
    let err = search::search(None, &request(&[])).unwrap_err();
    assert!(matches!(err, SearchError::Unavailable));
}
