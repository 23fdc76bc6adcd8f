use html_scraper::{ElementRef, Html, Node, Selector};
use regex::Regex;
use std::sync::OnceLock;

/// Lines shorter than this are treated as captions / UI fragments and dropped.
pub const MIN_LINE_CHARS: usize = 100;

/// Upper bound on candidate containers scored per document.
const MAX_CANDIDATES: usize = 20_000;

/// Subtrees whose text never counts as body content.
const DROPPED_TAGS: [&str; 8] = [
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside",
];

fn newline_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("valid newline-run regex"))
}

fn class_or_id_lc(el: &ElementRef) -> String {
    let mut out = String::new();
    if let Some(c) = el.value().attr("class") {
        out.push_str(c);
        out.push(' ');
    }
    if let Some(i) = el.value().attr("id") {
        out.push_str(i);
    }
    out.to_ascii_lowercase()
}

fn is_boilerplate_container(el: &ElementRef) -> bool {
    // Structural UI words only; no per-site rules.
    let s = class_or_id_lc(el);
    if s.is_empty() {
        return false;
    }
    [
        "nav",
        "navbar",
        "menu",
        "sidebar",
        "footer",
        "header",
        "banner",
        "cookie",
        "consent",
        "advert",
        "promo",
        "subscribe",
        "newsletter",
    ]
    .iter()
    .any(|bad| s.contains(bad))
}

fn element_text_chars(el: &ElementRef) -> usize {
    el.text().map(|t| t.chars().count()).sum()
}

fn element_link_text_chars(el: &ElementRef) -> usize {
    let Ok(sel) = Selector::parse("a") else {
        return 0;
    };
    el.select(&sel)
        .map(|a| a.text().map(|t| t.chars().count()).sum::<usize>())
        .sum()
}

/// Readability-style pick of the element most likely to hold the article body.
fn pick_main_region(doc: &Html) -> Option<ElementRef<'_>> {
    let sel = Selector::parse("article, main, section, div").ok()?;
    let mut best_score: i64 = 0;
    let mut best: Option<ElementRef<'_>> = None;

    for el in doc.select(&sel).take(MAX_CANDIDATES) {
        if is_boilerplate_container(&el) {
            continue;
        }
        let txt = element_text_chars(&el);
        if txt < 20 {
            continue;
        }
        let link_txt = element_link_text_chars(&el);
        // Dense non-link text wins; link text is usually navigation or tag clouds.
        let mut score = txt as i64 - 2 * (link_txt as i64);
        match el.value().name() {
            "article" => score += 500,
            "main" => score += 300,
            _ => {}
        }
        if link_txt > txt / 2 {
            score -= 500;
        }
        if score > best_score {
            best_score = score;
            best = Some(el);
        }
    }

    best
}

fn collect_text<'a>(el: ElementRef<'a>, out: &mut Vec<&'a str>) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push(&**t),
            Node::Element(e) if DROPPED_TAGS.contains(&e.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// Main-content region of `html` with all markup stripped.
///
/// Text nodes are joined with a single space, so line breaks only come from
/// the text itself.
pub fn main_content_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let body_sel = Selector::parse("body").ok();
    let region = pick_main_region(&doc)
        .or_else(|| body_sel.and_then(|s| doc.select(&s).next()))
        .unwrap_or_else(|| doc.root_element());

    let mut parts = Vec::new();
    collect_text(region, &mut parts);
    parts.join(" ")
}

/// First `top_k` paragraph-like lines of `html`, using [`MIN_LINE_CHARS`].
pub fn extract_paragraphs(html: &str, top_k: usize) -> Vec<String> {
    extract_paragraphs_with(html, top_k, MIN_LINE_CHARS)
}

/// Lossy paragraph extraction: main region, strip tags, fold blank-line runs
/// into a space, keep lines of at least `min_line_chars` chars, take `top_k`.
pub fn extract_paragraphs_with(html: &str, top_k: usize, min_line_chars: usize) -> Vec<String> {
    // Failed fetches arrive as "" and must stay cheap.
    if html.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let text = main_content_text(html);
    let text = newline_runs().replace_all(&text, " ");
    text.split('\n')
        .filter(|line| line.chars().count() >= min_line_chars)
        .take(top_k)
        .map(str::to_string)
        .collect()
}
