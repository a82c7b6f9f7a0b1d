//! Field extraction from one professor card's HTML.
//!
//! Cards come in several layouts, so each field is looked up through a chain
//! of fallbacks; a field that cannot be found is left empty.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::model::{dedup_in_order, CardObservation};

const NAME_LABEL: &str = "نام استاد:";
const SHORT_NAME_LABEL: &str = "نام:";
const MAJOR_LABEL: &str = "گرایش:";
const H_INDEX_LABEL: &str = "امتیاز علمی";
const FIELDS_LABEL: &str = "حوزه";
const LINK_TEXT: &str = "لینک";
const EMAIL_TEXT: &str = "ایمیل";

static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static HEADING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h3, h2, .result-professor__name, .card-title").unwrap()
});
static MAJOR_TAG: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".prof-major, .major-tag, .result-professor__branch").unwrap()
});
static PROFILE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/fa/as"], a[href*="/as/"]"#).unwrap());
static MAILTO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href^="mailto:"]"#).unwrap());
static FIELD_TAG: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".result-professor__research-value span, .research-tag, .chip").unwrap()
});
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Everything read off a card, before the university is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCard {
    pub name: String,
    /// Majors printed on the card, space-joined; empty when absent.
    pub majors: String,
    pub h_index: String,
    pub profile_url: String,
    pub email: String,
    pub research_fields: Vec<String>,
}

impl ParsedCard {
    pub fn into_observation(self, university: &str) -> CardObservation {
        CardObservation {
            name: self.name,
            university: university.to_string(),
            major_label: self.majors,
            h_index: self.h_index,
            profile_url: self.profile_url,
            email: self.email,
            research_fields: self.research_fields,
        }
    }
}

pub fn parse_card(html: &str) -> ParsedCard {
    let doc = Html::parse_fragment(html);
    let root = doc.root_element();
    ParsedCard {
        name: extract_name(root),
        majors: extract_majors(root),
        h_index: extract_h_index(root),
        profile_url: extract_profile_url(root),
        email: extract_email(root),
        research_fields: extract_fields(root),
    }
}

fn extract_name(root: ElementRef) -> String {
    value_after_label(root, &SPAN, NAME_LABEL)
        .or_else(|| value_after_label(root, &DIV, SHORT_NAME_LABEL))
        .map(text_of)
        .filter(|t| !t.is_empty())
        .or_else(|| root.select(&HEADING).map(text_of).find(|t| !t.is_empty()))
        .unwrap_or_default()
}

fn extract_majors(root: ElementRef) -> String {
    let mut majors: Vec<String> = root
        .select(&SPAN)
        .filter(|s| text_of(*s).contains(MAJOR_LABEL))
        .flat_map(|label| following_elements(label, "span"))
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();
    if majors.is_empty() {
        majors = root.select(&MAJOR_TAG).map(text_of).filter(|t| !t.is_empty()).collect();
    }
    dedup_in_order(majors).join(" ")
}

fn extract_h_index(root: ElementRef) -> String {
    let text = value_after_label(root, &SPAN, H_INDEX_LABEL)
        .or_else(|| innermost_containing(root, &DIV, H_INDEX_LABEL))
        .map(text_of)
        .unwrap_or_default();
    let text = ascii_digits(&text);
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        text
    } else {
        digits
    }
}

fn extract_profile_url(root: ElementRef) -> String {
    root.select(&PROFILE_LINK)
        .chain(root.select(&ANCHOR).filter(|a| text_of(*a).contains(LINK_TEXT)))
        .find_map(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .unwrap_or_default()
}

fn extract_email(root: ElementRef) -> String {
    if let Some(href) = root.select(&MAILTO).find_map(|a| a.value().attr("href")) {
        return href.trim_start_matches("mailto:").trim().to_string();
    }
    root.select(&ANCHOR)
        .map(text_of)
        .filter(|t| t.contains(EMAIL_TEXT) || t.contains('@'))
        .find_map(|t| EMAIL_RE.find(&t).map(|m| m.as_str().to_string()))
        .unwrap_or_default()
}

fn extract_fields(root: ElementRef) -> Vec<String> {
    let tagged = root.select(&FIELD_TAG).map(text_of);
    let labelled = innermost_containing(root, &DIV, FIELDS_LABEL)
        .into_iter()
        .flat_map(|div| div.select(&SPAN))
        .map(text_of)
        .filter(|t| !t.contains(FIELDS_LABEL));
    dedup_in_order(tagged.chain(labelled).filter(|t| !t.is_empty()))
}

/// Visible text with whitespace runs collapsed.
fn text_of(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `tag`-matching element whose text contains `label`, then the
/// element immediately after it if it has the same tag name.
fn value_after_label<'a>(root: ElementRef<'a>, tag: &Selector, label: &str) -> Option<ElementRef<'a>> {
    root.select(tag)
        .filter(|el| text_of(*el).contains(label))
        .find_map(|el| {
            el.next_siblings()
                .find_map(ElementRef::wrap)
                .filter(|next| next.value().name() == el.value().name())
        })
}

fn following_elements<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(move |sib| sib.value().name() == name)
}

/// The deepest element matching `sel` whose text contains `needle`.
fn innermost_containing<'a>(root: ElementRef<'a>, sel: &Selector, needle: &str) -> Option<ElementRef<'a>> {
    root.select(sel)
        .filter(|el| text_of(*el).contains(needle))
        .find(|el| !el.select(sel).any(|inner| inner != *el && text_of(inner).contains(needle)))
}

/// Map Persian and Arabic-Indic digits to ASCII.
fn ascii_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELLED_CARD: &str = r#"
        <div class="card bg-base-100 shadow-xl mb-4">
          <div class="card-body">
            <div><span>نام استاد:</span><span> دکتر علی   رضایی </span></div>
            <div><span>گرایش:</span><span>هوش مصنوعی</span><span>نرم افزار</span><span>هوش مصنوعی</span></div>
            <div><span>امتیاز علمی:</span><span>۱۲</span></div>
            <a href="https://scholar.ut.ac.ir/fa/as/rezaei">لینک صفحه</a>
            <a href="mailto: rezaei@ut.ac.ir">ایمیل</a>
            <div class="result-professor__research-value">
              <span>یادگیری ماشین</span><span>بینایی</span><span>یادگیری ماشین</span>
            </div>
          </div>
        </div>"#;

    const CLASS_CARD: &str = r#"
        <div class="result-professor">
          <h3 class="result-professor__name">Sara Ahmadi</h3>
          <span class="result-professor__branch">Networks</span>
          <div class="score">امتیاز علمی: 7</div>
          <a href="/profile/42">لینک</a>
          <a href="/contact">ایمیل: sara.ahmadi@ut.ac.ir</a>
          <span class="chip">SDN</span><span class="research-tag">5G</span>
        </div>"#;

    #[test]
    fn labelled_layout() {
        let card = parse_card(LABELLED_CARD);
        assert_eq!(card.name, "دکتر علی رضایی");
        assert_eq!(card.majors, "هوش مصنوعی نرم افزار");
        assert_eq!(card.h_index, "12");
        assert_eq!(card.profile_url, "https://scholar.ut.ac.ir/fa/as/rezaei");
        assert_eq!(card.email, "rezaei@ut.ac.ir");
        assert_eq!(card.research_fields, vec!["یادگیری ماشین", "بینایی"]);
    }

    #[test]
    fn class_layout() {
        let card = parse_card(CLASS_CARD);
        assert_eq!(card.name, "Sara Ahmadi");
        assert_eq!(card.majors, "Networks");
        assert_eq!(card.h_index, "7");
        assert_eq!(card.profile_url, "/profile/42");
        assert_eq!(card.email, "sara.ahmadi@ut.ac.ir");
        assert_eq!(card.research_fields, vec!["SDN", "5G"]);
    }

    #[test]
    fn short_name_label() {
        let card = parse_card("<div><div>نام:</div><div>Reza</div></div>");
        assert_eq!(card.name, "Reza");
    }

    #[test]
    fn empty_card_yields_empty_fields() {
        let card = parse_card("<div class=\"card\"><p>nothing here</p></div>");
        assert_eq!(card, ParsedCard::default());
    }

    #[test]
    fn non_numeric_h_index_kept_as_text() {
        let card = parse_card("<div><span>امتیاز علمی:</span><span>ندارد</span></div>");
        assert_eq!(card.h_index, "ندارد");
    }

    #[test]
    fn email_text_without_address_is_ignored() {
        let card = parse_card("<div><a href=\"/x\">ایمیل</a></div>");
        assert_eq!(card.email, "");
    }

    #[test]
    fn fields_from_labelled_block() {
        let card = parse_card(
            "<div><h3>X</h3><div><span>حوزه پژوهشی:</span><span>Databases</span><span>IR</span></div></div>",
        );
        assert_eq!(card.research_fields, vec!["Databases", "IR"]);
    }

    #[test]
    fn observation_carries_university() {
        let obs = parse_card(CLASS_CARD).into_observation("University of Tehran");
        assert_eq!(obs.university, "University of Tehran");
        assert_eq!(obs.major_label, "Networks");
    }

    #[test]
    fn persian_digits_converted() {
        assert_eq!(ascii_digits("۱۲۳ و ٤٥"), "123 و 45");
    }
}
