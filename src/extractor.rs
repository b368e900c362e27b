//! Blog post body extraction.
//!
//! Posts linked from the blog review feed were written across several
//! editor generations, each with its own markup. Tiers are tried newest
//! first and the first one matching any element wins:
//!
//! | Tier | Selector |
//! |---|---|
//! | SmartEditor ONE | `body div.se-main-container p.se-text-paragraph` |
//! | SmartEditor 3 | `body div.se_component_wrap p.se_textarea` |
//! | Legacy post view | `body div#postViewArea p` |
//! | Legacy type selector | `body div#viewTypeSelector p` |
//!
//! A page matching no tier is not an error; the item just goes without
//! body text.

use crate::error::Result;
use crate::http::Fetch;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    SmartEditorOne,
    SmartEditor3,
    PostViewArea,
    ViewTypeSelector,
}

impl ExtractionTier {
    /// Priority order, newest markup first.
    pub const ALL: [ExtractionTier; 4] = [
        ExtractionTier::SmartEditorOne,
        ExtractionTier::SmartEditor3,
        ExtractionTier::PostViewArea,
        ExtractionTier::ViewTypeSelector,
    ];

    pub fn selector(&self) -> &'static str {
        match self {
            ExtractionTier::SmartEditorOne => "body div.se-main-container p.se-text-paragraph",
            ExtractionTier::SmartEditor3 => "body div.se_component_wrap p.se_textarea",
            ExtractionTier::PostViewArea => "body div#postViewArea p",
            ExtractionTier::ViewTypeSelector => "body div#viewTypeSelector p",
        }
    }
}

static TIER_SELECTORS: Lazy<Vec<(ExtractionTier, Selector)>> = Lazy::new(|| {
    ExtractionTier::ALL
        .iter()
        .map(|tier| {
            let selector = Selector::parse(tier.selector()).expect("valid tier selector");
            (*tier, selector)
        })
        .collect()
});

// Hangul jamo consonants, jamo vowels, precomposed syllables, and spaces.
static HANGUL_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new("[ㄱ-ㅎㅏ-ㅣ가-힣 ]+").expect("valid hangul pattern"));
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid space pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub tier: ExtractionTier,
    pub text: String,
}

/// Pull body text out of post markup using the first tier that matches.
///
/// Each matched element contributes all of its descendant text; elements
/// are joined with a single space in document order.
pub fn extract_text(html: &str) -> Option<Extracted> {
    let document = Html::parse_document(html);

    TIER_SELECTORS.iter().find_map(|(tier, selector)| {
        let mut matched = document.select(selector).peekable();
        matched.peek()?;
        let text = matched
            .map(|element| element.text().collect::<String>())
            .join(" ");
        Some(Extracted { tier: *tier, text })
    })
}

/// Keep only Hangul runs (with their inner spaces) and collapse whitespace.
pub fn filter_to_hangul(text: &str) -> String {
    let kept = HANGUL_RUN.find_iter(text).map(|m| m.as_str()).join(" ");
    MULTI_SPACE.replace_all(&kept, " ").trim().to_string()
}

/// Fetch a post and extract its body text.
///
/// # Arguments
///
/// * `fetcher` - Transport for the post request
/// * `url` - Post page, on any host
/// * `korean_only` - Narrow the text with [`filter_to_hangul`]
///
/// # Returns
///
/// `Ok(None)` when no tier matches, otherwise the text of the first
/// matching tier. A failed fetch is an `Err`, never `Ok(None)`.
#[instrument(level = "debug", skip(fetcher))]
pub async fn extract<F: Fetch>(fetcher: &F, url: &str, korean_only: bool) -> Result<Option<String>> {
    let html = fetcher.get_text(url).await?;

    let Some(Extracted { tier, text }) = extract_text(&html) else {
        info!(%url, bytes = html.len(), "No extraction tier matched; skipping body text");
        return Ok(None);
    };
    debug!(?tier, chars = text.chars().count(), "Extracted post body");

    if korean_only {
        Ok(Some(filter_to_hangul(&text)))
    } else {
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StubFetcher;

    const SMART_EDITOR_ONE: &str = r#"<html><body>
        <div class="se-main-container">
          <p class="se-text-paragraph"><span>첫 문단</span></p>
          <p class="se-text-paragraph"><span>둘째</span> <b>문단</b></p>
        </div></body></html>"#;

    const SMART_EDITOR_3: &str = r#"<html><body>
        <div class="se_component_wrap"><p class="se_textarea">v3 body</p></div>
        </body></html>"#;

    const POST_VIEW_AREA: &str = r#"<html><body>
        <div id="postViewArea"><p>old</p><p>view</p></div>
        </body></html>"#;

    const VIEW_TYPE_SELECTOR: &str = r#"<html><body>
        <div id="viewTypeSelector"><div><p>oldest layout</p></div></div>
        </body></html>"#;

    const NO_TIER: &str = r#"<html><body><article><p>a cafe post</p></article></body></html>"#;

    #[test]
    fn test_each_fixture_uses_its_own_tier() {
        let cases = [
            (SMART_EDITOR_ONE, ExtractionTier::SmartEditorOne, "첫 문단 둘째 문단"),
            (SMART_EDITOR_3, ExtractionTier::SmartEditor3, "v3 body"),
            (POST_VIEW_AREA, ExtractionTier::PostViewArea, "old view"),
            (VIEW_TYPE_SELECTOR, ExtractionTier::ViewTypeSelector, "oldest layout"),
        ];
        for (html, tier, text) in cases {
            let extracted = extract_text(html).unwrap();
            assert_eq!(extracted.tier, tier);
            assert_eq!(extracted.text, text);
        }
    }

    #[test]
    fn test_no_tier_is_skipped() {
        assert_eq!(extract_text(NO_TIER), None);
    }

    #[test]
    fn test_newer_tier_wins_over_older() {
        let html = r#"<html><body>
            <div id="postViewArea"><p>legacy</p></div>
            <div class="se_component_wrap"><p class="se_textarea">newer</p></div>
            </body></html>"#;
        let extracted = extract_text(html).unwrap();
        assert_eq!(extracted.tier, ExtractionTier::SmartEditor3);
        assert_eq!(extracted.text, "newer");
    }

    #[test]
    fn test_filter_to_hangul() {
        assert_eq!(filter_to_hangul("Hello 안녕   하세요 World"), "안녕 하세요");
        assert_eq!(filter_to_hangul("맛집!! 추천ㅋㅋ 10/10"), "맛집 추천ㅋㅋ");
        assert_eq!(filter_to_hangul("only latin"), "");
    }

    #[tokio::test]
    async fn test_extract_with_filter() {
        let stub = StubFetcher::new().with_body(
            "http://blog.test/1",
            r#"<body><div id="postViewArea"><p>Great 맛있어요</p><p>Again  또  올게요!</p></div></body>"#,
        );
        let text = extract(&stub, "http://blog.test/1", true).await.unwrap();
        assert_eq!(text.as_deref(), Some("맛있어요 또 올게요"));
    }

    #[tokio::test]
    async fn test_extract_unmatched_page_is_none() {
        let stub = StubFetcher::new().with_body("http://blog.test/2", NO_TIER);
        assert_eq!(extract(&stub, "http://blog.test/2", false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_extract_propagates_fetch_failure() {
        let stub = StubFetcher::new().with_status("http://blog.test/3", 503);
        assert!(extract(&stub, "http://blog.test/3", false).await.is_err());
    }
}
