//! PubMed efetch XML parser.
//!
//! Streams a `<PubmedArticleSet>` document with `quick_xml` and builds one
//! [`PaperRecord`] per `<PubmedArticle>`. Missing optional fields become empty
//! values; only a payload that is not well-formed XML (or not an article set
//! at all) is an error.

use crate::error::{PapersError, Result};
use crate::models::{Author, PaperRecord, PublicationDate};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

const ROOT_ELEMENT: &str = "PubmedArticleSet";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

/// "2023 Jan-Feb", "1998 Dec 7-14", "2021-2022", "2022 Winter"
static MEDLINE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(?:\s+([A-Za-z]{3})[A-Za-z]*)?(?:\s+(\d{1,2}))?")
        .expect("valid MedlineDate regex")
});

/// Parse an efetch payload into paper records.
pub fn parse(payload: &str) -> Result<Vec<PaperRecord>> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = Reader::from_str(payload);
    let mut parser = ArticleSetParser::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let position = reader.buffer_position();
                return Err(parser.malformed(format!("XML error at byte {}: {}", position, e)));
            }
        };

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                parser.start(name)?;
            }
            Event::Empty(e) => {
                // Self-closing elements carry no text; only the root matters
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if parser.stack.is_empty() {
                    parser.check_root(&name)?;
                    parser.seen_root = true;
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| parser.malformed(format!("Bad text escape: {}", err)))?;
                parser.text(&text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                parser.text(&text);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                parser.end(&name);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    parser.finish()
}

/// Streaming state for one document
#[derive(Default)]
struct ArticleSetParser {
    stack: Vec<String>,
    seen_root: bool,
    current: Option<ArticleBuilder>,
    papers: Vec<PaperRecord>,
    last_pmid: Option<String>,
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: String,
    title: String,
    pub_date: DateParts,
    article_date: DateParts,
    authors: Vec<Author>,
    author: Option<AuthorBuilder>,
}

#[derive(Default)]
struct AuthorBuilder {
    last_name: String,
    fore_name: String,
    collective_name: String,
    affiliations: Vec<String>,
    affiliation: String,
}

#[derive(Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
    medline: String,
}

impl ArticleSetParser {
    fn malformed(&self, message: String) -> PapersError {
        PapersError::MalformedResponse {
            id: self
                .last_pmid
                .as_ref()
                .map(|p| format!("payload after PMID {}", p))
                .unwrap_or_else(|| "payload".to_string()),
            message,
        }
    }

    fn check_root(&self, name: &str) -> Result<()> {
        if name != ROOT_ELEMENT {
            return Err(self.malformed(format!(
                "Expected <{}> root element, found <{}>",
                ROOT_ELEMENT, name
            )));
        }
        Ok(())
    }

    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn within(&self, name: &str) -> bool {
        self.stack.iter().any(|n| n == name)
    }

    fn start(&mut self, name: String) -> Result<()> {
        if self.stack.is_empty() {
            self.check_root(&name)?;
            self.seen_root = true;
        }

        match name.as_str() {
            "PubmedArticle" => self.current = Some(ArticleBuilder::default()),
            "Author" if self.parent() == Some("AuthorList") => {
                if let Some(article) = self.current.as_mut() {
                    article.author = Some(AuthorBuilder::default());
                }
            }
            "Affiliation" => {
                if let Some(author) = self.current.as_mut().and_then(|a| a.author.as_mut()) {
                    author.affiliation.clear();
                }
            }
            _ => {}
        }

        self.stack.push(name);
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(element) = self.stack.last().map(String::as_str) else {
            return;
        };
        let parent = self
            .stack
            .len()
            .checked_sub(2)
            .and_then(|i| self.stack.get(i))
            .map(String::as_str);
        let in_title = self.within("ArticleTitle");
        let in_affiliation = self.within("Affiliation");
        let in_comments = self.within("CommentsCorrectionsList");

        let Some(article) = self.current.as_mut() else {
            return;
        };

        if in_title {
            article.title.push_str(text);
            return;
        }

        if let Some(author) = article.author.as_mut() {
            if in_affiliation {
                author.affiliation.push_str(text);
                return;
            }
            match element {
                "LastName" => author.last_name.push_str(text),
                "ForeName" => author.fore_name.push_str(text),
                "CollectiveName" => author.collective_name.push_str(text),
                _ => {}
            }
            return;
        }

        match (parent, element) {
            (Some("MedlineCitation"), "PMID") if article.pmid.is_empty() && !in_comments => {
                article.pmid = text.trim().to_string();
            }
            (Some("PubDate"), field) => article.pub_date.set(field, text),
            (Some("ArticleDate"), field) => article.article_date.set(field, text),
            _ => {}
        }
    }

    fn end(&mut self, name: &str) {
        self.stack.pop();

        if name == "PubmedArticle" {
            if let Some(article) = self.current.take() {
                match article.build() {
                    Some(paper) => self.papers.push(paper),
                    None => warn!("Skipping PubmedArticle without PMID"),
                }
            }
            return;
        }

        let in_author_list = self.parent() == Some("AuthorList");
        let Some(article) = self.current.as_mut() else {
            return;
        };

        match name {
            "Affiliation" => {
                if let Some(author) = article.author.as_mut() {
                    let affiliation = normalize_whitespace(&author.affiliation);
                    if !affiliation.is_empty() {
                        author.affiliations.push(affiliation);
                    }
                    author.affiliation.clear();
                }
            }
            "Author" if in_author_list => {
                if let Some(author) = article.author.take() {
                    article.authors.push(author.build());
                }
            }
            "PMID" if !article.pmid.is_empty() => {
                self.last_pmid = Some(article.pmid.clone());
            }
            _ => {}
        }
    }

    fn finish(self) -> Result<Vec<PaperRecord>> {
        if !self.stack.is_empty() {
            return Err(self.malformed(format!(
                "Unexpected end of document inside <{}>",
                self.stack.join("/")
            )));
        }
        if !self.seen_root {
            return Err(self.malformed("No root element".to_string()));
        }
        debug!(count = self.papers.len(), "Parsed PubMed articles");
        Ok(self.papers)
    }
}

impl AuthorBuilder {
    fn build(self) -> Author {
        let personal = format!("{} {}", self.fore_name.trim(), self.last_name.trim());
        let personal = normalize_whitespace(&personal);
        let name = if personal.is_empty() {
            normalize_whitespace(&self.collective_name)
        } else {
            personal
        };

        let email = self
            .affiliations
            .iter()
            .find_map(|aff| EMAIL_RE.find(aff))
            .map(|m| m.as_str().to_string());

        Author {
            name,
            affiliations: self.affiliations,
            email,
            is_corresponding: false,
        }
    }
}

impl ArticleBuilder {
    fn build(self) -> Option<PaperRecord> {
        if self.pmid.is_empty() {
            return None;
        }

        let mut authors = self.authors;
        if let Some(first_with_email) = authors.iter_mut().find(|a| a.email.is_some()) {
            first_with_email.is_corresponding = true;
        }

        Some(PaperRecord {
            id: self.pmid,
            title: normalize_whitespace(&self.title),
            publication_date: self.pub_date.resolve().or_else(|| self.article_date.resolve()),
            authors,
        })
    }
}

impl DateParts {
    fn set(&mut self, field: &str, text: &str) {
        match field {
            "Year" => self.year.push_str(text),
            "Month" => self.month.push_str(text),
            "Day" => self.day.push_str(text),
            "MedlineDate" => self.medline.push_str(text),
            _ => {}
        }
    }

    fn resolve(&self) -> Option<PublicationDate> {
        if let Ok(year) = self.year.trim().parse::<i32>() {
            let month = parse_month(&self.month);
            let day = self
                .day
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|d| (1..=31).contains(d));
            return Some(PublicationDate::new(year, month, day));
        }

        let caps = MEDLINE_DATE_RE.captures(self.medline.trim())?;
        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let month = caps.get(2).and_then(|m| parse_month(m.as_str()));
        let day = caps
            .get(3)
            .and_then(|d| d.as_str().parse::<u32>().ok())
            .filter(|d| (1..=31).contains(d));
        Some(PublicationDate::new(year, month, day))
    }
}

/// Month as a number ("3", "03") or English name/abbreviation ("Mar", "March")
fn parse_month(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }

    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = text.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
