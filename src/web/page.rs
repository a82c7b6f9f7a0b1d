//! Server-rendered search page.

use std::fmt::Write;

use crate::db::{SortDirection, SortField};
use crate::model::ProfessorRecord;
use crate::search::{SearchPage, SearchRequest};

use super::Theme;

const STYLE: &str = r#"
body { font-family: Vazirmatn, Tahoma, sans-serif; margin: 0; padding: 1.5rem; }
body.dark { background: #15171c; color: #e4e6eb; }
body.light { background: #fafafa; color: #1c1e21; }
a { color: inherit; }
header { display: flex; justify-content: space-between; align-items: center; }
form { display: flex; gap: .5rem; margin: 1rem 0; flex-wrap: wrap; }
input { padding: .4rem .6rem; min-width: 16rem; }
table { border-collapse: collapse; width: 100%; }
th, td { padding: .45rem .6rem; border-bottom: 1px solid #8884; text-align: start; vertical-align: top; }
th a { text-decoration: none; }
.chip { display: inline-block; margin: 0 .2rem .2rem 0; padding: .1rem .5rem; border-radius: 1rem; border: 1px solid #8888; font-size: .85em; text-decoration: none; }
.pager { display: flex; gap: 1rem; justify-content: center; margin: 1rem 0; }
.muted { opacity: .7; }
"#;

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relative link to the page for `request`, already HTML-escaped.
fn link(request: &SearchRequest, theme: Option<Theme>) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    if !request.search_term.is_empty() {
        pairs.push(("search", request.search_term.clone()));
    }
    if !request.research_fields.is_empty() {
        pairs.push(("fields", request.research_fields.join(",")));
    }
    pairs.push(("sort_by", request.sort_by.as_str().to_string()));
    pairs.push(("sort_dir", request.sort_dir.as_str().to_string()));
    pairs.push(("page", request.page.to_string()));
    if let Some(theme) = theme {
        pairs.push(("theme", theme.as_str().to_string()));
    }
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    escape(&format!("/?{}", query.join("&")))
}

fn sort_header(request: &SearchRequest, field: SortField, label: &str) -> String {
    let mut target = request.clone();
    target.page = 1;
    target.sort_by = field;
    target.sort_dir = if request.sort_by == field && request.sort_dir == SortDirection::Asc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };
    let arrow = match (request.sort_by == field, request.sort_dir) {
        (false, _) => "",
        (true, SortDirection::Asc) => " ▲",
        (true, SortDirection::Desc) => " ▼",
    };
    format!("<th><a href=\"{}\">{}{}</a></th>", link(&target, None), label, arrow)
}

fn field_chips(request: &SearchRequest, record: &ProfessorRecord) -> String {
    let mut out = String::new();
    for field in &record.research_fields {
        let mut target = request.clone();
        target.page = 1;
        if !target.research_fields.contains(field) {
            target.research_fields.push(field.clone());
        }
        let _ = write!(
            out,
            "<a class=\"chip\" href=\"{}\">{}</a>",
            link(&target, None),
            escape(field)
        );
    }
    out
}

fn row(request: &SearchRequest, r: &ProfessorRecord) -> String {
    let name = if r.profile_url.is_empty() {
        escape(&r.name)
    } else {
        format!("<a href=\"{}\">{}</a>", escape(&r.profile_url), escape(&r.name))
    };
    let email = if r.email.is_empty() {
        String::new()
    } else {
        format!("<a href=\"mailto:{0}\">{0}</a>", escape(&r.email))
    };
    format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
        r.id,
        name,
        escape(&r.university),
        escape(&r.major),
        escape(r.h_index.as_deref().unwrap_or_default()),
        email,
        field_chips(request, r),
    )
}

fn pager(page: &SearchPage, request: &SearchRequest) -> String {
    let mut out = String::from("<nav class=\"pager\">");
    if page.page > 1 {
        let mut prev = request.clone();
        prev.page = page.page - 1;
        let _ = write!(out, "<a href=\"{}\">&laquo; Previous</a>", link(&prev, None));
    }
    let _ = write!(out, "<span>Page {} of {}</span>", page.page, page.total_pages.max(1));
    if page.page < page.total_pages {
        let mut next = request.clone();
        next.page = page.page + 1;
        let _ = write!(out, "<a href=\"{}\">Next &raquo;</a>", link(&next, None));
    }
    out.push_str("</nav>");
    out
}

fn shell(theme: Theme, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"fa\" dir=\"rtl\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Professor Directory</title>\n<style>{STYLE}</style>\n</head>\n\
         <body class=\"{}\">\n{body}</body>\n</html>\n",
        theme.as_str()
    )
}

pub fn render(page: &SearchPage, request: &SearchRequest, theme: Theme) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "<header><h1>Professor Directory</h1><a href=\"{}\">{} theme</a></header>\n",
        link(request, Some(theme.toggled())),
        theme.toggled().label()
    );

    let _ = write!(
        body,
        "<form method=\"get\" action=\"/\">\
         <input type=\"search\" name=\"search\" placeholder=\"Name, university, major or field\" value=\"{}\">\
         <input type=\"text\" name=\"fields\" placeholder=\"Fields, comma separated\" value=\"{}\">\
         <input type=\"hidden\" name=\"sort_by\" value=\"{}\">\
         <input type=\"hidden\" name=\"sort_dir\" value=\"{}\">\
         <button type=\"submit\">Search</button></form>\n",
        escape(&request.search_term),
        escape(&request.research_fields.join(", ")),
        request.sort_by.as_str(),
        request.sort_dir.as_str(),
    );

    let _ = writeln!(body, "<p class=\"muted\">{} professors found</p>", page.total_count);

    if page.records.is_empty() {
        body.push_str("<p>No professors match this search.</p>\n");
    } else {
        body.push_str("<table>\n<thead><tr><th>#</th>");
        body.push_str(&sort_header(request, SortField::Name, "Name"));
        body.push_str(&sort_header(request, SortField::University, "University"));
        body.push_str(&sort_header(request, SortField::Major, "Major"));
        body.push_str(&sort_header(request, SortField::HIndex, "H-index"));
        body.push_str("<th>Email</th><th>Research fields</th></tr></thead>\n<tbody>\n");
        for record in &page.records {
            body.push_str(&row(request, record));
        }
        body.push_str("</tbody>\n</table>\n");
    }

    body.push_str(&pager(page, request));
    shell(theme, &body)
}

pub fn render_unavailable(theme: Theme) -> String {
    shell(
        theme,
        "<h1>Database Connection Error</h1>\
         <p>Failed to open the professor store. Please check that it has been loaded.</p>\n",
    )
}
