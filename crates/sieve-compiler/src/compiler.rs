//! Rule compiler
//!
//! Turns parsed network rules into compiled-list entries: pure hostnames go
//! to the realm's hostname dictionary, everything else is filed under the
//! token picked by the `TokenPolicy`.

use log::{debug, trace};
use regex::RegexBuilder;
use serde::Serialize;

use sieve_core::compiled::{CompiledEntry, CompiledWriter, NetworkEntry, TokenSlot};
use sieve_core::types::{FilterFlags, MatchKind, Realm};

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::optimizer::optimize_rules;
use crate::parser::{logical_lines, parse_line, NetworkRule, ParsedLine};
use crate::tokenizer::TokenPolicy;

/// Why a parsed rule could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("unsupported pattern: {0}")]
    UnsupportedPattern(String),
    #[error("filter matches every request")]
    Untokenizable,
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    policy: TokenPolicy,
}

impl Compiler {
    pub fn new(policy: TokenPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Compile one rule into `writer`.
    pub fn compile(&self, rule: &NetworkRule, writer: &mut CompiledWriter) -> Result<(), CompileError> {
        if let Some(hostname) = rule.pure_hostname() {
            writer.push(&CompiledEntry::Hostname {
                flags: Realm::from_flags(rule.flags).flags(),
                hostname: hostname.to_string(),
            });
            return Ok(());
        }

        let (kind, token) = if rule.is_regex {
            RegexBuilder::new(&rule.pattern)
                .case_insensitive(!rule.flags.contains(FilterFlags::MATCH_CASE))
                .build()
                .map_err(|e| CompileError::UnsupportedPattern(error_summary(&e.to_string())))?;
            (MatchKind::Regex, TokenSlot::Regex)
        } else {
            if rule.pattern.is_empty() && rule.type_mask.is_empty() && rule.party_mask.is_empty() && rule.domain_opt.is_empty() {
                return Err(CompileError::Untokenizable);
            }
            let lower = rule.pattern.to_ascii_lowercase();
            let token = match self.policy.select(&lower, rule.flags) {
                Some(t) => TokenSlot::Token(t.to_string()),
                None => TokenSlot::NoToken,
            };
            (match_kind(rule), token)
        };

        writer.push(&CompiledEntry::Network(NetworkEntry {
            flags: rule.flags,
            kind,
            type_mask: rule.type_mask,
            party_mask: rule.party_mask,
            token,
            pattern: rule.pattern.clone(),
            domain_opt: rule.domain_opt.clone(),
            raw: rule.raw.clone(),
        }));
        Ok(())
    }
}

fn match_kind(rule: &NetworkRule) -> MatchKind {
    let flags = rule.flags;
    let has_wildcards = rule.pattern.contains(['*', '^']);
    if flags.contains(FilterFlags::HOST_ANCHOR) {
        MatchKind::HostnameAnchor
    } else if flags.contains(FilterFlags::LEFT_ANCHOR | FilterFlags::RIGHT_ANCHOR) && !has_wildcards {
        MatchKind::Exact
    } else if has_wildcards || flags.intersects(FilterFlags::LEFT_ANCHOR | FilterFlags::RIGHT_ANCHOR) {
        MatchKind::Wildcard
    } else {
        MatchKind::Plain
    }
}

/// Regex errors span several lines; the last one names the problem.
fn error_summary(message: &str) -> String {
    message.lines().last().unwrap_or(message).trim().to_string()
}

// =============================================================================
// Whole Lists
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    /// Logical lines read
    pub lines: usize,
    /// Entries written
    pub accepted: usize,
    /// Lines reported to the diagnostic sink
    pub rejected: usize,
    /// Comments and blank lines
    pub comments: usize,
    pub cosmetic: usize,
    pub deduplicated: usize,
    pub badfilter_rules: usize,
    pub badfiltered: usize,
}

/// Output of `compile_list`.
#[derive(Debug, Clone)]
pub struct CompiledList {
    pub text: String,
    pub stats: CompileStats,
}

impl Compiler {
    /// Parse, clean up and compile a whole list. Bad lines are reported to
    /// `sink` and skipped.
    pub fn compile_list(&self, text: &str, name: &str, sink: &mut dyn DiagnosticSink) -> CompiledList {
        let mut stats = CompileStats::default();
        let mut rules: Vec<(usize, NetworkRule)> = Vec::new();

        for (line, logical) in logical_lines(text) {
            stats.lines += 1;
            match parse_line(&logical) {
                ParsedLine::Empty | ParsedLine::Comment => stats.comments += 1,
                ParsedLine::Cosmetic => stats.cosmetic += 1,
                ParsedLine::Network(rule) => rules.push((line, rule)),
                ParsedLine::Invalid(e) => {
                    trace!("{}:{}: {}", name, line, e);
                    stats.rejected += 1;
                    sink.report(Diagnostic {
                        line,
                        text: logical.trim().to_string(),
                        kind: DiagnosticKind::Parse(e),
                    });
                }
            }
        }

        let optimized = optimize_rules(&mut rules);
        stats.deduplicated = optimized.deduped;
        stats.badfilter_rules = optimized.badfilter_rules;
        stats.badfiltered = optimized.badfiltered_rules;

        let mut writer = CompiledWriter::new(name);
        for (line, rule) in &rules {
            if let Err(e) = self.compile(rule, &mut writer) {
                trace!("{}:{}: {}", name, line, e);
                stats.rejected += 1;
                sink.report(Diagnostic {
                    line: *line,
                    text: rule.raw.clone(),
                    kind: DiagnosticKind::Compile(e),
                });
            }
        }
        stats.accepted = writer.len();

        debug!(
            "compiled {}: {} lines, {} accepted, {} rejected, {} deduplicated, {} badfiltered",
            name, stats.lines, stats.accepted, stats.rejected, stats.deduplicated, stats.badfiltered
        );

        CompiledList {
            text: writer.finish(),
            stats,
        }
    }
}

/// Compile a list with the default token policy.
pub fn compile_list(text: &str, name: &str, sink: &mut dyn DiagnosticSink) -> CompiledList {
    Compiler::default().compile_list(text, name, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_core::types::{FilteringContext, MatchResult, RequestType};
    use sieve_core::{Engine, EngineConfig, Hit};

    fn compile_one(line: &str) -> Result<CompiledEntry, CompileError> {
        let rule = match parse_line(line) {
            ParsedLine::Network(rule) => rule,
            other => panic!("{line:?} parsed as {other:?}"),
        };
        let mut writer = CompiledWriter::new("test");
        Compiler::default().compile(&rule, &mut writer)?;
        let text = writer.finish();
        let entry_line = text.lines().nth(1).expect("one entry");
        Ok(CompiledEntry::decode(entry_line).expect("decodable"))
    }

    fn network(line: &str) -> NetworkEntry {
        match compile_one(line) {
            Ok(CompiledEntry::Network(n)) => n,
            other => panic!("{line:?} compiled to {other:?}"),
        }
    }

    fn engine(lists: &[(&str, &str)]) -> Engine {
        let mut engine = Engine::new(EngineConfig::default());
        for (name, text) in lists {
            let compiled = compile_list(text, name, &mut ());
            engine.load_compiled(&compiled.text).expect("load");
        }
        engine.freeze();
        engine
    }

    fn verdict(engine: &Engine, url: &str, doc: &str, ty: RequestType) -> MatchResult {
        engine.match_request(&FilteringContext::new(url, doc, ty)).result
    }

    #[test]
    fn pure_hostnames_go_to_dictionary() {
        assert_eq!(
            compile_one("||ads.example.com^").unwrap(),
            CompiledEntry::Hostname {
                flags: FilterFlags::empty(),
                hostname: "ads.example.com".to_string()
            }
        );
        assert_eq!(
            compile_one("@@||ads.example.com^").unwrap(),
            CompiledEntry::Hostname {
                flags: FilterFlags::EXCEPTION,
                hostname: "ads.example.com".to_string()
            }
        );
        assert_eq!(
            compile_one("||ads.example.com^$important").unwrap(),
            CompiledEntry::Hostname {
                flags: FilterFlags::IMPORTANT,
                hostname: "ads.example.com".to_string()
            }
        );
    }

    #[test]
    fn kinds_and_tokens() {
        let n = network("||ads.example.com/banner^$script");
        assert_eq!(n.kind, MatchKind::HostnameAnchor);
        assert_eq!(n.token, TokenSlot::Token("example".to_string()));

        let n = network("|https://x.org/ad.js|");
        assert_eq!(n.kind, MatchKind::Exact);
        assert_eq!(n.token, TokenSlot::Token("org".to_string()));

        let n = network("/ad/*/banner.");
        assert_eq!(n.kind, MatchKind::Wildcard);
        assert_eq!(n.token, TokenSlot::Token("banner".to_string()));

        let n = network("-advert-");
        assert_eq!(n.kind, MatchKind::Plain);
        assert_eq!(n.token, TokenSlot::Token("advert".to_string()));

        let n = network("advert");
        assert_eq!(n.token, TokenSlot::NoToken);

        let n = network(r"/ad[0-9]+\.js/");
        assert_eq!(n.kind, MatchKind::Regex);
        assert_eq!(n.token, TokenSlot::Regex);
    }

    #[test]
    fn match_case_keeps_pattern_case() {
        let n = network("/Banner/Ad.$match-case");
        assert_eq!(n.pattern, "/Banner/Ad.");
        assert_eq!(n.token, TokenSlot::Token("banner".to_string()));
    }

    #[test]
    fn unsupported_regex() {
        assert!(matches!(compile_one(r"/(?<=ad)s/"), Err(CompileError::UnsupportedPattern(_))));
        assert!(matches!(compile_one(r"/(a)\1/"), Err(CompileError::UnsupportedPattern(_))));
    }

    #[test]
    fn constraint_only_rule_is_no_token() {
        let n = network("$script,third-party,domain=example.com");
        assert_eq!(n.token, TokenSlot::NoToken);
        assert_eq!(n.pattern, "");
    }

    #[test]
    fn list_stats_and_diagnostics() {
        let text = "! comment\n\
                    \n\
                    ||ads.example.com^\n\
                    example.com##.ad\n\
                    /ads/$redirect=noop.js\n\
                    ||ads.example.com^\n\
                    ||tracker.net^$badfilter\n\
                    ||tracker.net^\n\
                    /(?=x)/\n";
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let list = compile_list(text, "mixed", &mut diagnostics);

        assert_eq!(list.stats.lines, 9);
        assert_eq!(list.stats.comments, 2);
        assert_eq!(list.stats.cosmetic, 1);
        assert_eq!(list.stats.deduplicated, 1);
        assert_eq!(list.stats.badfilter_rules, 1);
        assert_eq!(list.stats.badfiltered, 1);
        assert_eq!(list.stats.accepted, 1);
        assert_eq!(list.stats.rejected, 2);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].line, 5);
        assert!(matches!(diagnostics[0].kind, DiagnosticKind::Parse(_)));
        assert_eq!(diagnostics[1].line, 9);
        assert!(matches!(diagnostics[1].kind, DiagnosticKind::Compile(CompileError::UnsupportedPattern(_))));
        assert!(diagnostics[0].to_string().starts_with("line 5: unsupported option"));
    }

    #[test]
    fn scenario_hostname_block() {
        let engine = engine(&[("easylist", "||ads.example.com^\n")]);
        assert_eq!(
            verdict(&engine, "https://ads.example.com/x.js", "https://news.site/", RequestType::SCRIPT),
            MatchResult::Blocked
        );
    }

    #[test]
    fn scenario_exception_wins() {
        let engine = engine(&[("easylist", "||ads.example.com^\n@@||ads.example.com/allowed.js\n")]);
        let ctx = FilteringContext::new(
            "https://ads.example.com/allowed.js",
            "https://news.site/",
            RequestType::SCRIPT,
        );
        let verdict = engine.match_request(&ctx);
        assert_eq!(verdict.result, MatchResult::Allowed);
        let log = engine.to_log_data(&verdict).expect("log data");
        assert_eq!(log.raw_filter, "@@||ads.example.com/allowed.js");
        assert_eq!(log.source_list, "easylist");
    }

    #[test]
    fn scenario_important_beats_exception() {
        let engine = engine(&[(
            "easylist",
            "||ads.example.com^$important\n@@||ads.example.com/allowed.js\n",
        )]);
        let ctx = FilteringContext::new(
            "https://ads.example.com/allowed.js",
            "https://news.site/",
            RequestType::SCRIPT,
        );
        let verdict = engine.match_request(&ctx);
        assert_eq!(verdict.result, MatchResult::Blocked);
        assert!(matches!(verdict.winner.as_ref().map(|w| &w.hit), Some(Hit::Hostname { .. })));
        let log = engine.to_log_data(&verdict).expect("log data");
        assert_eq!(log.raw_filter, "||ads.example.com^$important");
    }

    #[test]
    fn scenario_no_match() {
        let engine = engine(&[("easylist", "||ads.example.com^\n/banner/ad.gif\n")]);
        let result = verdict(&engine, "https://cdn.example.org/app.css", "https://example.org/", RequestType::STYLESHEET);
        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(u8::from(result), 0);
    }

    #[test]
    fn scenario_broken_cosmetic_among_valid_rules() {
        let text = "||ads.example.com^\n###%%%broken\n/banner/ad.gif\n@@||ads.example.com/ok.js\n";
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let list = compile_list(text, "easylist", &mut diagnostics);
        assert_eq!(list.stats.accepted, 3);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
        assert_eq!(diagnostics[0].text, "###%%%broken");

        let mut engine = Engine::default();
        let loaded = engine.load_compiled(&list.text).expect("load");
        assert_eq!(loaded.network + loaded.hostnames, 3);
    }

    #[test]
    fn options_round_trip_through_engine() {
        let engine = engine(&[(
            "privacy",
            "||tracker.net/pixel^$image,third-party,domain=news.site|~sub.news.site\n",
        )]);
        let url = "https://tracker.net/pixel?id=1";
        assert_eq!(verdict(&engine, url, "https://news.site/", RequestType::IMAGE), MatchResult::Blocked);
        assert_eq!(verdict(&engine, url, "https://sub.news.site/", RequestType::IMAGE), MatchResult::NoMatch);
        assert_eq!(verdict(&engine, url, "https://news.site/", RequestType::SCRIPT), MatchResult::NoMatch);
        assert_eq!(verdict(&engine, url, "https://tracker.net/", RequestType::IMAGE), MatchResult::NoMatch);
    }

    #[test]
    fn popup_and_elemhide_lines_compile() {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let list = "||ads.example.com^\n||pop.example.com^$popup\n@@||news.site^$elemhide\n";
        let compiled = compile_list(list, "easy", &mut diagnostics);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(compiled.stats.accepted, 3);

        let engine = engine(&[("easy", list)]);
        let doc = "https://news.site/";
        let popup = RequestType::POPUP;
        assert_eq!(verdict(&engine, "https://pop.example.com/", doc, popup), MatchResult::Blocked);
        assert_eq!(verdict(&engine, "https://ads.example.com/", doc, popup), MatchResult::NoMatch);
        assert_eq!(verdict(&engine, "https://ads.example.com/", doc, RequestType::SCRIPT), MatchResult::Blocked);
        assert_eq!(verdict(&engine, doc, doc, RequestType::ELEMHIDE), MatchResult::Allowed);
        assert_eq!(verdict(&engine, "https://other.org/", doc, RequestType::ELEMHIDE), MatchResult::NoMatch);
    }
}
