//! Configuration-driven source adapter built on CSS selectors.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{
    CrawlableCandidate, DetailSelectors, Listing, ListingItem, ListingSelectors, QueryMethod,
    SearchResult, SourceDefinition,
};
use crate::sources::SourceAdapter;
use crate::utils::http::RequestBody;
use crate::utils::{encode_keywords, extract_item_id, parse_info_hash, parse_size, resolve_url};

const HINT_TITLE: &str = "title";
const HINT_SIZE: &str = "size";
const HINT_LOCATOR: &str = "locator";

struct ListingRules {
    row: Selector,
    title: Selector,
    link: Option<Selector>,
    attr_name: String,
    size: Option<Selector>,
    locator: Option<Selector>,
    locator_attr: String,
    hash: Option<Selector>,
}

impl ListingRules {
    fn compile(selectors: &ListingSelectors) -> Result<Self> {
        Ok(Self {
            row: parse_selector(&selectors.row_selector)?,
            title: parse_selector(&selectors.title_selector)?,
            link: parse_optional(selectors.link_selector.as_deref())?,
            attr_name: selectors.attr_name.clone(),
            size: parse_optional(selectors.size_selector.as_deref())?,
            locator: parse_optional(selectors.locator_selector.as_deref())?,
            locator_attr: selectors.locator_attr.clone(),
            hash: parse_optional(selectors.hash_selector.as_deref())?,
        })
    }
}

struct DetailRules {
    locator: Selector,
    locator_attr: String,
    title: Option<Selector>,
    size: Option<Selector>,
    hash: Option<Selector>,
    license: Option<Selector>,
}

impl DetailRules {
    fn compile(selectors: &DetailSelectors) -> Result<Self> {
        Ok(Self {
            locator: parse_selector(&selectors.locator_selector)?,
            locator_attr: selectors.locator_attr.clone(),
            title: parse_optional(selectors.title_selector.as_deref())?,
            size: parse_optional(selectors.size_selector.as_deref())?,
            hash: parse_optional(selectors.hash_selector.as_deref())?,
            license: parse_optional(selectors.license_selector.as_deref())?,
        })
    }
}

/// A [`SourceAdapter`] described by a [`SourceDefinition`].
///
/// Rows whose locator is already on the listing page become complete
/// results; the rest become candidates for a detail crawl.
pub struct SelectorSource {
    definition: SourceDefinition,
    base_url: Url,
    listing: ListingRules,
    detail: Option<DetailRules>,
    blocked_markers: Vec<String>,
}

impl SelectorSource {
    /// Compile every selector up front; an invalid one is a configuration error.
    pub fn new(definition: SourceDefinition) -> Result<Self> {
        definition.validate()?;

        let base_url = Url::parse(&definition.query_url_for(1, "")).map_err(|e| {
            AppError::config(format!(
                "source '{}': invalid query_url: {e}",
                definition.name
            ))
        })?;
        let listing = ListingRules::compile(&definition.listing)?;
        let detail = definition
            .detail
            .as_ref()
            .map(DetailRules::compile)
            .transpose()?;
        let blocked_markers = definition
            .blocked_markers
            .iter()
            .filter(|m| !m.trim().is_empty())
            .map(|m| m.to_lowercase())
            .collect();

        Ok(Self {
            definition,
            base_url,
            listing,
            detail,
            blocked_markers,
        })
    }

    fn parse_row(&self, row: &ElementRef) -> Result<ListingItem> {
        let rules = &self.listing;
        let name = &self.definition.name;

        let title_elem = row
            .select(&rules.title)
            .next()
            .ok_or_else(|| AppError::parse(name.as_str(), "row without title element"))?;
        let title = element_text(&title_elem);
        if title.is_empty() {
            return Err(AppError::parse(name.as_str(), "row with empty title"));
        }

        let link_elem = rules
            .link
            .as_ref()
            .and_then(|sel| row.select(sel).next())
            .unwrap_or(title_elem);
        let raw_link = link_elem
            .value()
            .attr(&rules.attr_name)
            .map(str::trim)
            .unwrap_or("");
        if raw_link.is_empty() {
            return Err(AppError::parse(
                name.as_str(),
                format!("row '{title}' has no {} attribute", rules.attr_name),
            ));
        }
        let details_url = resolve_url(&self.base_url, raw_link);

        let size = rules
            .size
            .as_ref()
            .and_then(|sel| row.select(sel).next())
            .and_then(|el| parse_size(&element_text(&el)));
        let locator = rules
            .locator
            .as_ref()
            .and_then(|sel| row.select(sel).next())
            .and_then(|el| el.value().attr(&rules.locator_attr))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(|href| resolve_url(&self.base_url, href));
        let hash = rules
            .hash
            .as_ref()
            .and_then(|sel| row.select(sel).next())
            .map(|el| element_text(&el))
            .filter(|h| !h.is_empty())
            .or_else(|| locator.as_deref().and_then(parse_info_hash));

        if let Some(locator) = locator {
            let mut result = SearchResult::new(name.as_str(), title, details_url, locator)
                .with_size(size.unwrap_or(0));
            if let Some(hash) = hash {
                result = result.with_hash(hash);
            }
            return Ok(ListingItem::Complete(result));
        }

        if self.detail.is_none() {
            return Err(AppError::parse(
                name.as_str(),
                format!("row '{title}' has no locator and the source has no detail page"),
            ));
        }

        let item_id = extract_item_id(&details_url).unwrap_or_else(|| details_url.clone());
        let mut candidate =
            CrawlableCandidate::new(name.as_str(), details_url, item_id).with_hint(HINT_TITLE, title);
        if let Some(size) = size {
            candidate = candidate.with_hint(HINT_SIZE, size.to_string());
        }
        if let Some(hash) = hash {
            candidate = candidate.with_hash(hash);
        }
        Ok(ListingItem::Candidate(candidate))
    }
}

impl SourceAdapter for SelectorSource {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn max_pages(&self) -> usize {
        self.definition.max_pages
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.definition
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn build_query_url(&self, page: usize, keywords: &str) -> Result<String> {
        if keywords.trim().is_empty() {
            return Err(AppError::validation("search keywords are empty"));
        }
        Ok(self
            .definition
            .query_url_for(page, &encode_keywords(keywords)))
    }

    fn build_query_body(&self, page: usize, keywords: &str) -> Result<Option<RequestBody>> {
        let definition = &self.definition;
        let body = match definition.method {
            QueryMethod::Get => None,
            QueryMethod::Post => definition
                .body_for(page, &encode_keywords(keywords))
                .map(RequestBody::form),
            QueryMethod::PostJson => definition
                .body_for(page, &json_string_content(keywords.trim())?)
                .map(RequestBody::json),
        };
        Ok(body)
    }

    fn parse_listing(&self, bytes: &[u8]) -> Result<Listing> {
        let html = String::from_utf8_lossy(bytes);
        let document = Html::parse_document(&html);

        let items: Vec<Result<ListingItem>> = document
            .select(&self.listing.row)
            .map(|row| self.parse_row(&row))
            .collect();
        let has_more = !items.is_empty();

        log::debug!(
            "[{}] listing page has {} row(s)",
            self.definition.name,
            items.len()
        );
        Ok(Listing::new(items, has_more))
    }

    fn build_detail_url(&self, candidate: &CrawlableCandidate) -> Option<String> {
        self.detail.as_ref().map(|_| candidate.details_url.clone())
    }

    fn parse_detail(
        &self,
        candidate: &CrawlableCandidate,
        bytes: Option<&[u8]>,
    ) -> Result<SearchResult> {
        let name = self.definition.name.as_str();
        let hinted_title = candidate.hint(HINT_TITLE).map(str::to_string);
        let hinted_size = candidate.hint(HINT_SIZE).and_then(|s| s.parse::<u64>().ok());

        let (Some(bytes), Some(rules)) = (bytes, self.detail.as_ref()) else {
            let locator = candidate.hint(HINT_LOCATOR).ok_or_else(|| {
                AppError::parse(name, format!("no locator for {}", candidate.details_url))
            })?;
            let title = hinted_title.ok_or_else(|| {
                AppError::parse(name, format!("no title for {}", candidate.details_url))
            })?;
            return Ok(finish(candidate, title, locator.to_string(), hinted_size, None, None));
        };

        let html = String::from_utf8_lossy(bytes);
        let document = Html::parse_document(&html);
        let base = Url::parse(&candidate.details_url).unwrap_or_else(|_| self.base_url.clone());

        let locator = document
            .select(&rules.locator)
            .next()
            .and_then(|el| el.value().attr(&rules.locator_attr))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(|href| resolve_url(&base, href))
            .ok_or_else(|| {
                AppError::parse(
                    name,
                    format!("details page {} has no locator", candidate.details_url),
                )
            })?;

        let first_text = |sel: &Option<Selector>| {
            sel.as_ref()
                .and_then(|s| document.select(s).next())
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty())
        };

        let title = first_text(&rules.title).or(hinted_title).ok_or_else(|| {
            AppError::parse(name, format!("no title for {}", candidate.details_url))
        })?;
        let size = first_text(&rules.size)
            .and_then(|s| parse_size(&s))
            .or(hinted_size);
        let hash = first_text(&rules.hash);
        let license = first_text(&rules.license);

        Ok(finish(candidate, title, locator, size, hash, license))
    }

    fn is_blocked(&self, bytes: &[u8]) -> bool {
        if self.blocked_markers.is_empty() {
            return false;
        }
        let body = String::from_utf8_lossy(bytes).to_lowercase();
        self.blocked_markers.iter().any(|m| body.contains(m))
    }
}

fn finish(
    candidate: &CrawlableCandidate,
    title: String,
    locator: String,
    size: Option<u64>,
    hash: Option<String>,
    license: Option<String>,
) -> SearchResult {
    let hash = hash
        .or_else(|| candidate.hash.clone())
        .or_else(|| parse_info_hash(&locator));
    let mut result = SearchResult::new(
        candidate.source.as_str(),
        title,
        candidate.details_url.as_str(),
        locator,
    )
    .with_size(size.unwrap_or(0));
    if let Some(hash) = hash {
        result = result.with_hash(hash);
    }
    if let Some(license) = license {
        result = result.with_license(license);
    }
    result
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn parse_optional(s: Option<&str>) -> Result<Option<Selector>> {
    s.map(parse_selector).transpose()
}

/// `text` escaped for use between the quotes of a JSON string.
fn json_string_content(text: &str) -> Result<String> {
    let quoted = serde_json::to_string(text)?;
    Ok(quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or_default()
        .to_string())
}
