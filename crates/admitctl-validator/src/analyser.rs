//! Multi-signal threat scoring (C4): pattern matches + behavioural score +
//! reputation offset combine into a [`SecurityAssessment`].

use admitctl_patterns::{AttackCategory, PatternLibrary, RiskTier, Sanitiser, ThreatLevel};
use admitctl_threatintel::{Reputation, ThreatIntelStore};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::models::{RecommendedAction, SecurityAssessment};
use crate::request::Request;

const FORWARDED_IP_HEADERS: &[&str] = &["x-forwarded-for", "x-real-ip", "x-client-ip", "cf-connecting-ip", "true-client-ip"];

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    assessment: SecurityAssessment,
    cached_at: Instant,
}

/// Produces a [`SecurityAssessment`] for a request, combining the pattern
/// library (C2) and the threat-intelligence store (C3).
pub struct SecurityAnalyser {
    patterns: PatternLibrary,
    store: std::sync::Arc<ThreatIntelStore>,
    sanitiser: std::sync::Arc<Sanitiser>,
    cache: DashMap<(String, String, String), CacheEntry>,
}

fn tier_weight(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::High => 0.4,
        RiskTier::Medium => 0.2,
        RiskTier::Low => 0.1,
        RiskTier::Critical => 0.4,
    }
}

fn threat_level_from_score(score: f64) -> ThreatLevel {
    if score >= 0.9 {
        ThreatLevel::Critical
    } else if score >= 0.7 {
        ThreatLevel::High
    } else if score >= 0.4 {
        ThreatLevel::Medium
    } else if score >= 0.1 {
        ThreatLevel::Low
    } else {
        ThreatLevel::None
    }
}

fn reputation_offset(reputation: Reputation) -> f64 {
    match reputation {
        Reputation::Malicious => 0.8,
        Reputation::Suspicious => 0.4,
        Reputation::Unknown => 0.0,
        Reputation::Trusted => -0.2,
    }
}

fn percent_encoded_count(path: &str) -> usize {
    path.as_bytes()
        .windows(3)
        .filter(|w| w[0] == b'%' && w[1].is_ascii_hexdigit() && w[2].is_ascii_hexdigit())
        .count()
}

impl SecurityAnalyser {
    pub fn new(
        patterns: PatternLibrary,
        store: std::sync::Arc<ThreatIntelStore>,
        sanitiser: std::sync::Arc<Sanitiser>,
    ) -> Self {
        Self {
            patterns,
            store,
            sanitiser,
            cache: DashMap::new(),
        }
    }

    fn resolve_client_ip(&self, request: &Request) -> String {
        for header in FORWARDED_IP_HEADERS {
            if let Some(value) = request.headers.get(header) {
                let candidate = value.split(',').next().unwrap_or(value).trim();
                if !candidate.is_empty() {
                    return candidate.to_string();
                }
            }
        }
        request.client_addr.clone().unwrap_or_else(|| "unknown".to_string())
    }

    /// Runs the eight-step analysis described for C4. Cached for five
    /// minutes per `(client_ip_hash, method, path)` to absorb scan storms.
    pub fn analyse(&self, request: &Request) -> SecurityAssessment {
        let client_ip = self.resolve_client_ip(request);
        let client_ip_hash = self.sanitiser.hash_ip(&client_ip);

        let cache_key = (client_ip_hash.clone(), request.method.clone(), request.path.clone());
        if let Some(cached) = self.cache.get(&cache_key) {
            if cached.cached_at.elapsed() < CACHE_TTL {
                return cached.assessment.clone();
            }
        }

        let scan_text = request.scan_text();
        let mut pattern_matches = self.patterns.matches(&scan_text);
        for (_, value) in request.headers.iter() {
            pattern_matches.extend(self.patterns.matches(value));
        }
        let detected_patterns: Vec<(AttackCategory, String)> = pattern_matches
            .iter()
            .map(|m| (m.category, m.description.to_string()))
            .collect();
        let attack_categories: BTreeSet<AttackCategory> = pattern_matches.iter().map(|m| m.category).collect();

        let prior_entry = self.store.entry(&client_ip_hash);
        let user_agent = request.headers.get("user-agent").unwrap_or("");
        let behavioural = behavioural_score(&prior_entry, &request.path, user_agent);

        let reputation = self.store.reputation(&client_ip_hash);
        let pattern_density = (0.2 * pattern_matches.len() as f64).min(1.0);
        let category_sum: f64 = attack_categories
            .iter()
            .filter_map(|category| pattern_matches.iter().find(|m| m.category == *category))
            .map(|m| tier_weight(m.tier))
            .sum();

        let threat_score = (pattern_density + category_sum + behavioural * 0.3 + reputation_offset(reputation))
            .clamp(0.0, 1.0);
        let confidence_score = (pattern_density + category_sum + behavioural * 0.3).clamp(0.0, 1.0);
        let threat_level = threat_level_from_score(threat_score);

        let recommended_action = recommend_action(threat_level, reputation, confidence_score);

        if threat_level >= ThreatLevel::Medium {
            self.store.record(&client_ip_hash, threat_level, &attack_categories.iter().copied().collect::<Vec<_>>());
        }

        let mut risk_factors = Vec::new();
        if !attack_categories.is_empty() {
            risk_factors.push(format!("{} attack categories detected", attack_categories.len()));
        }
        if behavioural > 0.0 {
            risk_factors.push(format!("behavioural score {behavioural:.2}"));
        }
        if reputation != Reputation::Unknown {
            risk_factors.push(format!("client reputation: {reputation}"));
        }

        let assessment = SecurityAssessment {
            threat_level,
            detected_patterns,
            attack_categories,
            client_reputation: reputation,
            recommended_action,
            confidence_score,
            risk_factors,
            client_ip_hash: client_ip_hash.clone(),
            timestamp: Utc::now(),
        };

        self.cache.insert(
            cache_key,
            CacheEntry {
                assessment: assessment.clone(),
                cached_at: Instant::now(),
            },
        );
        assessment
    }

    /// Fallback used when C2/C3 are unavailable: pattern scan only, never
    /// recommends `block`.
    pub fn analyse_degraded(&self, request: &Request) -> SecurityAssessment {
        let client_ip = self.resolve_client_ip(request);
        let client_ip_hash = self.sanitiser.hash_ip(&client_ip);
        let scan_text = request.scan_text();
        let pattern_matches = self.patterns.matches(&scan_text);
        let attack_categories: BTreeSet<AttackCategory> = pattern_matches.iter().map(|m| m.category).collect();
        let threat_level = if attack_categories.is_empty() { ThreatLevel::None } else { ThreatLevel::Low };
        SecurityAssessment {
            threat_level,
            detected_patterns: pattern_matches.iter().map(|m| (m.category, m.description.to_string())).collect(),
            attack_categories,
            client_reputation: Reputation::Unknown,
            recommended_action: RecommendedAction::Monitor,
            confidence_score: 0.2,
            risk_factors: vec!["degraded analysis: reputation/behavioural signals unavailable".to_string()],
            client_ip_hash,
            timestamp: Utc::now(),
        }
    }
}

fn behavioural_score(
    prior_entry: &Option<admitctl_threatintel::ThreatIntelEntry>,
    path: &str,
    user_agent: &str,
) -> f64 {
    let mut score = 0.0;

    if let Some(entry) = prior_entry {
        let interval = Utc::now() - entry.last_seen;
        if interval < chrono::Duration::seconds(1) {
            score += 0.3;
        } else if interval < chrono::Duration::seconds(5) {
            score += 0.1;
        }
        if entry.attack_count > 10 {
            score += 0.4;
        } else if entry.attack_count > 5 {
            score += 0.2;
        }
    }

    let len = path.chars().count();
    if len > 500 {
        score += 0.2;
    } else if len > 200 {
        score += 0.1;
    }

    let encoded = percent_encoded_count(path);
    if encoded > 10 {
        score += 0.3;
    } else if encoded > 5 {
        score += 0.1;
    }

    let non_ascii = path.chars().filter(|c| !c.is_ascii()).count();
    score += (0.05 * non_ascii as f64).min(0.2);

    if user_agent.is_empty() {
        score += 0.2;
    } else {
        let lower = user_agent.to_ascii_lowercase();
        if ["bot", "crawler", "spider", "scraper"].iter().any(|kw| lower.contains(kw)) {
            score += 0.1;
        }
    }

    score.clamp(0.0, 1.0)
}

fn recommend_action(level: ThreatLevel, reputation: Reputation, confidence: f64) -> RecommendedAction {
    if reputation == Reputation::Malicious || level == ThreatLevel::Critical || (level == ThreatLevel::High && confidence > 0.7) {
        RecommendedAction::Block
    } else if matches!(level, ThreatLevel::High | ThreatLevel::Medium) || reputation == Reputation::Suspicious {
        RecommendedAction::RateLimit
    } else if level == ThreatLevel::Low || confidence < 0.3 {
        RecommendedAction::Monitor
    } else if level == ThreatLevel::None && reputation == Reputation::Trusted {
        RecommendedAction::Allow
    } else {
        RecommendedAction::Monitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admitctl_patterns::PatternLibrary;

    fn analyser() -> SecurityAnalyser {
        SecurityAnalyser::new(
            PatternLibrary::new().unwrap(),
            std::sync::Arc::new(ThreatIntelStore::in_memory()),
            std::sync::Arc::new(Sanitiser::with_salt([3u8; 16])),
        )
    }

    #[test]
    fn clean_request_is_none_threat() {
        let analyser = analyser();
        let request = Request::new("GET", "/api/widgets").with_client_addr("203.0.113.5");
        let assessment = analyser.analyse(&request);
        assert_eq!(assessment.threat_level, ThreatLevel::None);
        assert_eq!(assessment.recommended_action, RecommendedAction::Monitor);
    }

    #[test]
    fn sql_injection_in_query_raises_threat_level() {
        let analyser = analyser();
        let request = Request::new("GET", "/search")
            .with_query("q=1' OR '1'='1")
            .with_client_addr("203.0.113.6");
        let assessment = analyser.analyse(&request);
        assert!(assessment.threat_level >= ThreatLevel::Medium);
        assert!(assessment.attack_categories.contains(&AttackCategory::SqlInjection));
    }

    #[test]
    fn repeated_high_threat_requests_escalate_to_block() {
        let analyser = analyser();
        // Each distinct path avoids the per-(ip, method, path) analysis
        // cache, so every call actually recomputes against the client's
        // accumulated threat-intel score instead of replaying the first.
        for i in 0..6 {
            let request = Request::new("GET", format!("/exec/{i}"))
                .with_query("cmd=;cat /etc/passwd")
                .with_client_addr("198.51.100.9");
            analyser.analyse(&request);
        }
        let final_request = Request::new("GET", "/exec/final")
            .with_query("cmd=;cat /etc/passwd")
            .with_client_addr("198.51.100.9");
        let assessment = analyser.analyse(&final_request);
        assert_eq!(assessment.recommended_action, RecommendedAction::Block);
    }

    #[test]
    fn forwarded_for_header_takes_precedence_over_transport_addr() {
        let analyser = analyser();
        let a = Request::new("GET", "/x").with_header("x-forwarded-for", "198.51.100.1, 10.0.0.1").with_client_addr("10.0.0.1");
        let b = Request::new("GET", "/x").with_client_addr("198.51.100.1");
        assert_eq!(analyser.analyse(&a).client_ip_hash, analyser.analyse(&b).client_ip_hash);
    }

    #[test]
    fn degraded_analysis_never_recommends_block() {
        let analyser = analyser();
        let request = Request::new("GET", "/exec").with_query("cmd=;cat /etc/passwd");
        let assessment = analyser.analyse_degraded(&request);
        assert_ne!(assessment.recommended_action, RecommendedAction::Block);
    }
}
