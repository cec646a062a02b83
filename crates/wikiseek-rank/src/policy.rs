//! Multiplicative scoring policy over raw cosine similarities.

use wikiseek_core::{Chunk, ChunkType, RankingConfig, SearchResult};

/// Lowercased, punctuation-trimmed word tokens. Underscores are treated as
/// word separators so wiki titles like `Wireless_network` tokenize cleanly.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Per-query state shared by every candidate's scoring pass.
///
/// Built once per search from the original and final (possibly refined)
/// query. Intent classification and topic triggers consider tokens from
/// both, since colloquial trigger words live in the original query while
/// the refined query carries the technical vocabulary.
#[derive(Debug, Clone)]
pub struct QueryContext {
    original_tokens: Vec<String>,
    final_tokens: Vec<String>,
    /// Union of both token sets.
    all_tokens: Vec<String>,
    overview_seeking: bool,
}

impl QueryContext {
    /// Build the context for one search.
    pub fn new(original_query: &str, final_query: &str, config: &RankingConfig) -> Self {
        let original_tokens = tokenize(original_query);
        let final_tokens = tokenize(final_query);

        let mut all_tokens = original_tokens.clone();
        for t in &final_tokens {
            if !all_tokens.contains(t) {
                all_tokens.push(t.clone());
            }
        }

        let overview_seeking = all_tokens
            .iter()
            .any(|t| config.overview_terms.iter().any(|o| o == t));

        Self {
            original_tokens,
            final_tokens,
            all_tokens,
            overview_seeking,
        }
    }

    /// Whether the combined query contains a given lowercase token.
    fn has_token(&self, token: &str) -> bool {
        self.all_tokens.iter().any(|t| t == token)
    }

    /// Whether the query reads as overview-seeking ("how", "setup", ...).
    pub fn overview_seeking(&self) -> bool {
        self.overview_seeking
    }
}

/// One applied multiplier, named for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub name: &'static str,
    pub multiplier: f32,
}

/// The layered multiplicative scoring policy.
///
/// Each factor is evaluated independently against the query context and a
/// chunk; the final score is the base similarity times the product of all
/// applied multipliers. Factors run in a fixed order for reproducibility,
/// though the product is order-independent.
pub struct ScoringPolicy {
    config: RankingConfig,
}

impl ScoringPolicy {
    /// Create a policy from its heuristic tables.
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Build the per-query context this policy scores against.
    pub fn context(&self, original_query: &str, final_query: &str) -> QueryContext {
        QueryContext::new(original_query, final_query, &self.config)
    }

    /// Score a single candidate: pure, no shared state touched.
    pub fn score(&self, base: f32, ctx: &QueryContext, chunk: &Chunk) -> f32 {
        self.adjustments(ctx, chunk)
            .iter()
            .fold(base, |score, adj| score * adj.multiplier)
    }

    /// The multipliers this policy would apply, in application order.
    pub fn adjustments(&self, ctx: &QueryContext, chunk: &Chunk) -> Vec<Adjustment> {
        let mut applied = Vec::new();
        let title_lower = chunk.page_title.to_lowercase();

        if let Some(adj) = self.authority_boost(&title_lower) {
            applied.push(adj);
        }
        if let Some(adj) = self.topic_boost(ctx, chunk, &title_lower) {
            applied.push(adj);
        }
        if let Some(adj) = self.comprehensive_boost(chunk, &title_lower) {
            applied.push(adj);
        }
        applied.extend(self.content_quality_boosts(chunk));
        applied.push(self.granularity_preference(ctx, chunk.chunk_type));
        applied.extend(self.exact_match_boosts(ctx, chunk));

        applied
    }

    /// Canonical configuration/installation pages get a strong boost; the
    /// first matching tier wins so at most one applies.
    fn authority_boost(&self, title_lower: &str) -> Option<Adjustment> {
        for tier in &self.config.authority_tiers {
            if tier.keywords.iter().any(|kw| title_lower.contains(kw.as_str())) {
                return Some(Adjustment {
                    name: "authority",
                    multiplier: tier.multiplier,
                });
            }
        }
        None
    }

    /// Colloquial query terms mapped to technical synonym clusters.
    /// Applied at most once per result regardless of how many clusters or
    /// synonyms match.
    fn topic_boost(
        &self,
        ctx: &QueryContext,
        chunk: &Chunk,
        title_lower: &str,
    ) -> Option<Adjustment> {
        let prefix: String = chunk
            .content
            .chars()
            .take(self.config.topic_prefix_chars)
            .collect::<String>()
            .to_lowercase();

        for cluster in &self.config.topic_clusters {
            if !ctx.has_token(&cluster.trigger) {
                continue;
            }
            let hit = cluster
                .synonyms
                .iter()
                .any(|s| title_lower.contains(s.as_str()) || prefix.contains(s.as_str()));
            if hit {
                return Some(Adjustment {
                    name: "topic",
                    multiplier: self.config.topic_multiplier,
                });
            }
        }
        None
    }

    /// Titles/sections dense in generic indicator words read as
    /// comprehensive documents.
    fn comprehensive_boost(&self, chunk: &Chunk, title_lower: &str) -> Option<Adjustment> {
        let hay = format!("{} {}", title_lower, chunk.section_path.to_lowercase());
        let count = self
            .config
            .comprehensive_terms
            .iter()
            .filter(|term| hay.contains(term.as_str()))
            .count();

        if count >= self.config.comprehensive_threshold {
            Some(Adjustment {
                name: "comprehensive",
                multiplier: self.config.comprehensive_multiplier,
            })
        } else {
            None
        }
    }

    /// Length tiers, actionable verbs, and code presence.
    fn content_quality_boosts(&self, chunk: &Chunk) -> Vec<Adjustment> {
        let mut applied = Vec::new();
        let content_lower = chunk.content.to_lowercase();
        let chars = chunk.content.chars().count();

        for tier in &self.config.length_tiers {
            if chars > tier.min_chars {
                applied.push(Adjustment {
                    name: "content_length",
                    multiplier: tier.multiplier,
                });
                break;
            }
        }

        let verb_count = self
            .config
            .action_verbs
            .iter()
            .filter(|v| content_lower.contains(v.as_str()))
            .count();
        if verb_count >= self.config.action_verb_threshold {
            applied.push(Adjustment {
                name: "action_verbs",
                multiplier: self.config.action_verb_multiplier,
            });
        }

        if self
            .config
            .code_markers
            .iter()
            .any(|m| chunk.content.contains(m.as_str()))
        {
            applied.push(Adjustment {
                name: "code",
                multiplier: self.config.code_multiplier,
            });
        }

        applied
    }

    /// Overview-seeking queries prefer coarser chunks; narrow queries
    /// slightly prefer fine-grained ones.
    fn granularity_preference(&self, ctx: &QueryContext, chunk_type: ChunkType) -> Adjustment {
        let multiplier = if ctx.overview_seeking {
            match chunk_type {
                ChunkType::Large => self.config.overview_large,
                ChunkType::Medium => self.config.overview_medium,
                ChunkType::Small => self.config.overview_small,
            }
        } else {
            match chunk_type {
                ChunkType::Small => self.config.narrow_small,
                ChunkType::Medium | ChunkType::Large => 1.0,
            }
        };

        Adjustment {
            name: "granularity",
            multiplier,
        }
    }

    /// Literal query-token overlap with the title, scaled up to a ceiling.
    /// The refined query earns the larger ceiling; the original the
    /// smaller. When no refinement occurred the token sets coincide and
    /// both factors apply to the same fraction.
    fn exact_match_boosts(&self, ctx: &QueryContext, chunk: &Chunk) -> Vec<Adjustment> {
        let title_tokens = tokenize(&chunk.page_title);
        let mut applied = Vec::new();

        let frac_final = overlap_fraction(&ctx.final_tokens, &title_tokens);
        if frac_final > 0.0 {
            applied.push(Adjustment {
                name: "exact_match_refined",
                multiplier: 1.0 + self.config.refined_match_ceiling * frac_final,
            });
        }

        let frac_original = overlap_fraction(&ctx.original_tokens, &title_tokens);
        if frac_original > 0.0 {
            applied.push(Adjustment {
                name: "exact_match_original",
                multiplier: 1.0 + self.config.original_match_ceiling * frac_original,
            });
        }

        applied
    }
}

/// Fraction of `query_tokens` literally present in `title_tokens`.
fn overlap_fraction(query_tokens: &[String], title_tokens: &[String]) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let hits = query_tokens
        .iter()
        .filter(|t| title_tokens.contains(t))
        .count();
    hits as f32 / query_tokens.len() as f32
}

/// Sort descending by score and reassign ranks 1..N.
pub fn sort_and_rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikiseek_core::ChunkType;

    fn chunk(title: &str, section: &str, content: &str, chunk_type: ChunkType) -> Chunk {
        Chunk {
            page_title: title.to_string(),
            section_path: section.to_string(),
            content: content.to_string(),
            chunk_text: format!("{} - {}\n{}", title, section, content),
            url: format!("https://wiki.example.org/title/{}", title.replace(' ', "_")),
            chunk_type,
            section_level: 2,
        }
    }

    fn policy() -> ScoringPolicy {
        ScoringPolicy::new(RankingConfig::default())
    }

    fn ctx(original: &str, final_q: &str) -> QueryContext {
        QueryContext::new(original, final_q, &RankingConfig::default())
    }

    #[test]
    fn test_all_multipliers_positive() {
        let policy = policy();
        let contexts = [
            ctx("wifi broken", "wireless network configuration troubleshooting"),
            ctx("how do I setup grub", "grub bootloader installation"),
            ctx("iwctl", "iwctl"),
            ctx("", ""),
        ];
        let chunks = [
            chunk(
                "Network Configuration",
                "Wireless > Setup",
                &"configure install enable ```\nsudo pacman -S iwd\n``` ".repeat(40),
                ChunkType::Large,
            ),
            chunk("Iwd", "iwctl", "Use iwctl.", ChunkType::Small),
            chunk("Kernel", "Modules", "Short note", ChunkType::Medium),
        ];

        for ctx in &contexts {
            for c in &chunks {
                for adj in policy.adjustments(ctx, c) {
                    assert!(
                        adj.multiplier > 0.0,
                        "non-positive multiplier {} from {}",
                        adj.multiplier,
                        adj.name
                    );
                }
                // Sign preservation for negative base similarities.
                assert!(policy.score(-0.2, ctx, c) < 0.0);
                assert!(policy.score(0.2, ctx, c) > 0.0);
            }
        }
    }

    #[test]
    fn test_authority_tiers_first_match_wins() {
        let policy = policy();
        // Title matches both the specific tier ("network configuration")
        // and the general one ("guide"); only the specific applies.
        let c = chunk(
            "Network Configuration Guide",
            "Overview",
            "text",
            ChunkType::Medium,
        );
        let adjs = policy.adjustments(&ctx("x", "x"), &c);
        let authority: Vec<_> = adjs.iter().filter(|a| a.name == "authority").collect();
        assert_eq!(authority.len(), 1);
        assert!((authority[0].multiplier - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_topic_boost_applied_once() {
        let policy = policy();
        // Query triggers both "wifi" and "internet" clusters; both clusters
        // have matching synonyms in the chunk, but the boost applies once.
        let c = chunk(
            "NetworkManager",
            "Usage",
            "Configure wireless and ethernet connections",
            ChunkType::Medium,
        );
        let adjs = policy.adjustments(&ctx("wifi internet broken", "wifi internet broken"), &c);
        assert_eq!(adjs.iter().filter(|a| a.name == "topic").count(), 1);
    }

    #[test]
    fn test_topic_boost_respects_content_prefix() {
        let policy = policy();
        // Synonym appears only beyond the inspected prefix.
        let mut content = "x".repeat(300);
        content.push_str(" wireless");
        let c = chunk("Some Page", "Misc", &content, ChunkType::Medium);
        let adjs = policy.adjustments(&ctx("wifi", "wifi"), &c);
        assert!(adjs.iter().all(|a| a.name != "topic"));
    }

    #[test]
    fn test_comprehensive_threshold() {
        let policy = policy();
        let below = chunk("Printing", "Setup", "text", ChunkType::Medium);
        let at = chunk("Printing Setup", "Troubleshooting", "text", ChunkType::Medium);

        let adjs = policy.adjustments(&ctx("x", "x"), &below);
        assert!(adjs.iter().all(|a| a.name != "comprehensive"));

        let adjs = policy.adjustments(&ctx("x", "x"), &at);
        assert!(adjs.iter().any(|a| a.name == "comprehensive"));
    }

    #[test]
    fn test_length_tiers_first_match_wins() {
        let policy = policy();
        let long = chunk("A", "B", &"y".repeat(1200), ChunkType::Medium);
        let medium = chunk("A", "B", &"y".repeat(600), ChunkType::Medium);
        let short = chunk("A", "B", "y", ChunkType::Medium);

        let find = |c: &Chunk| {
            policy
                .adjustments(&ctx("x", "x"), c)
                .into_iter()
                .filter(|a| a.name == "content_length")
                .collect::<Vec<_>>()
        };

        let long_adjs = find(&long);
        assert_eq!(long_adjs.len(), 1);
        assert!((long_adjs[0].multiplier - 1.15).abs() < 1e-6);

        let medium_adjs = find(&medium);
        assert_eq!(medium_adjs.len(), 1);
        assert!((medium_adjs[0].multiplier - 1.1).abs() < 1e-6);

        assert!(find(&short).is_empty());
    }

    #[test]
    fn test_granularity_overview_vs_narrow() {
        let policy = policy();
        let overview = ctx("how to setup wifi", "wireless configuration");
        assert!(overview.overview_seeking());
        let narrow = ctx("iwctl station scan", "iwctl station scan");
        assert!(!narrow.overview_seeking());

        let large = chunk("A", "B", "c", ChunkType::Large);
        let small = chunk("A", "B", "c", ChunkType::Small);

        let g = |ctx: &QueryContext, c: &Chunk| {
            policy
                .adjustments(ctx, c)
                .into_iter()
                .find(|a| a.name == "granularity")
                .unwrap()
                .multiplier
        };

        assert!(g(&overview, &large) > g(&overview, &small));
        assert!(g(&overview, &small) < 1.0);
        assert!(g(&narrow, &small) > 1.0);
        assert!((g(&narrow, &large) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_ceilings() {
        let policy = policy();
        let c = chunk("Wireless Network", "Overview", "text", ChunkType::Medium);

        // Full overlap from both queries: (1 + 0.5) * (1 + 0.3).
        let full = ctx("wireless network", "wireless network");
        let adjs = policy.adjustments(&full, &c);
        let refined = adjs.iter().find(|a| a.name == "exact_match_refined").unwrap();
        let original = adjs
            .iter()
            .find(|a| a.name == "exact_match_original")
            .unwrap();
        assert!((refined.multiplier - 1.5).abs() < 1e-6);
        assert!((original.multiplier - 1.3).abs() < 1e-6);

        // No overlap: neither factor applies.
        let none = ctx("pacman", "pacman");
        let adjs = policy.adjustments(&none, &c);
        assert!(adjs.iter().all(|a| !a.name.starts_with("exact_match")));
    }

    #[test]
    fn test_score_is_product_of_adjustments() {
        let policy = policy();
        let ctx = ctx("wifi", "wireless network configuration");
        let c = chunk(
            "Network Configuration",
            "Wireless",
            "Install and configure the wireless stack with iwctl",
            ChunkType::Medium,
        );

        let product: f32 = policy
            .adjustments(&ctx, &c)
            .iter()
            .map(|a| a.multiplier)
            .product();
        let scored = policy.score(0.8, &ctx, &c);
        assert!((scored - 0.8 * product).abs() < 1e-5);
    }

    #[test]
    fn test_sort_and_rank_contiguous() {
        let mk = |score: f32| SearchResult {
            rank: 0,
            score,
            chunk: chunk("T", "S", "c", ChunkType::Small),
            original_query: "q".to_string(),
            final_query: "q".to_string(),
            aliases: vec!["T".to_string()],
        };
        let mut results = vec![mk(0.2), mk(0.9), mk(0.5)];
        sort_and_rank(&mut results);

        let ranks: Vec<u32> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }
}
