//! Domain detection
//!
//! Classifies a file from its extension, import keywords and content markers.
//! The extension decides when it is known; otherwise the domain with the most
//! content hits wins, ties going to the earlier entry in [`HEURISTICS`].

use crucible_types::{Domain, DomainContext};
use std::path::Path;

/// Detection rules for one domain
pub struct DomainHeuristic {
    pub domain: Domain,
    pub extensions: &'static [&'static str],
    pub imports: &'static [&'static str],
    pub markers: &'static [&'static str],
}

pub const HEURISTICS: [DomainHeuristic; 4] = [
    DomainHeuristic {
        domain: Domain::SmartContract,
        extensions: &["sol"],
        imports: &["@openzeppelin", "hardhat", "foundry", "forge-std"],
        markers: &["pragma solidity", "contract ", "modifier "],
    },
    DomainHeuristic {
        domain: Domain::Frontend,
        extensions: &["tsx", "jsx", "vue", "svelte"],
        imports: &["react", "next", "vue", "svelte", "@tanstack"],
        markers: &["use client", "use server", "useState", "useEffect"],
    },
    DomainHeuristic {
        domain: Domain::Backend,
        extensions: &["py", "go", "rs"],
        imports: &["fastapi", "flask", "django", "gin", "axum", "actix"],
        markers: &["@app.route", "@router"],
    },
    DomainHeuristic {
        domain: Domain::Infrastructure,
        extensions: &["tf", "yaml", "yml", "toml"],
        imports: &[],
        markers: &["resource \"", "provider \"", "apiVersion:", "kind:"],
    },
];

/// Language tag for a path, by extension
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "py" | "pyi" => "python",
        "rs" => "rust",
        "go" => "go",
        "sol" => "solidity",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "vue" => "vue",
        "svelte" => "svelte",
        "tf" | "tfvars" => "terraform",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "json" => "json",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "sh" | "bash" => "shell",
        "md" => "markdown",
        _ => return None,
    };
    Some(lang)
}

/// Classify one file
///
/// `content` may be empty, in which case only the extension is used.
pub fn detect(path: &str, content: &str) -> DomainContext {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let by_extension = HEURISTICS
        .iter()
        .find(|h| h.extensions.contains(&ext.as_str()));

    let domain = match by_extension {
        Some(h) => h.domain,
        None => HEURISTICS
            .iter()
            .map(|h| (h.domain, content_hits(h, content)))
            .filter(|(_, hits)| *hits > 0)
            .fold(None, |best: Option<(Domain, usize)>, (domain, hits)| match best {
                Some((_, top)) if top >= hits => best,
                _ => Some((domain, hits)),
            })
            .map(|(domain, _)| domain)
            .unwrap_or(Domain::Unknown),
    };

    let mut tags: Vec<String> = Vec::new();
    if let Some(lang) = language_for_path(path) {
        tags.push(lang.to_string());
    }
    for heuristic in &HEURISTICS {
        tags.extend(
            heuristic
                .imports
                .iter()
                .filter(|kw| mentions_import(content, kw))
                .map(|kw| kw.trim_start_matches('@').to_string()),
        );
    }

    DomainContext::new(domain, tags)
}

fn content_hits(heuristic: &DomainHeuristic, content: &str) -> usize {
    let imports = heuristic
        .imports
        .iter()
        .filter(|kw| mentions_import(content, kw))
        .count();
    let markers = heuristic
        .markers
        .iter()
        .filter(|m| content.contains(*m))
        .count();
    imports + markers
}

/// Whether an import-like line mentions `keyword` as a whole word
fn mentions_import(content: &str, keyword: &str) -> bool {
    content
        .lines()
        .map(str::trim_start)
        .filter(|l| {
            l.starts_with("import ")
                || l.starts_with("from ")
                || l.starts_with("use ")
                || l.starts_with("require")
                || l.contains("require(")
        })
        .any(|l| {
            l.split(|c: char| !(c.is_alphanumeric() || c == '@' || c == '-' || c == '_'))
                .any(|word| word == keyword)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_decides() {
        let ctx = detect("contracts/Vault.sol", "");
        assert_eq!(ctx.domain, Domain::SmartContract);
        assert!(ctx.has_tag("solidity"));
        assert!(ctx.has_tag("smart_contract"));

        assert_eq!(detect("deploy/main.tf", "").domain, Domain::Infrastructure);
        assert_eq!(detect("web/App.tsx", "").domain, Domain::Frontend);
    }

    #[test]
    fn test_import_keywords_become_tags() {
        let code = "from fastapi import FastAPI\nimport os\n\napp = FastAPI()\n";
        let ctx = detect("api/main.py", code);
        assert_eq!(ctx.domain, Domain::Backend);
        let tags: Vec<&str> = ctx.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["backend", "fastapi", "python"]);
    }

    #[test]
    fn test_scoped_package_tag_drops_at() {
        let code = "import \"@openzeppelin/contracts/token/ERC20/ERC20.sol\";\npragma solidity ^0.8.0;\n";
        let ctx = detect("Token.sol", code);
        assert!(ctx.has_tag("openzeppelin"));
        assert!(!ctx.has_tag("@openzeppelin"));
    }

    #[test]
    fn test_content_markers_without_known_extension() {
        let manifest = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";
        assert_eq!(detect("k8s/service", manifest).domain, Domain::Infrastructure);

        let page = "'use client'\nimport React, { useState } from 'react'\n";
        let ctx = detect("app/page.js", page);
        assert_eq!(ctx.domain, Domain::Frontend);
        assert!(ctx.has_tag("react"));
        assert!(ctx.has_tag("javascript"));
    }

    #[test]
    fn test_unknown() {
        let ctx = detect("README", "hello");
        assert_eq!(ctx.domain, Domain::Unknown);
        assert_eq!(ctx.tags.len(), 1);
        assert!(ctx.has_tag("unknown"));
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("a/b.PY"), Some("python"));
        assert_eq!(language_for_path("Cargo.lock"), None);
        assert_eq!(language_for_path("Makefile"), None);
    }
}
