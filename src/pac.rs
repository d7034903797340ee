//! PAC script generation from an AdBlock-style list.

use crate::adblock::{AdBlockList, ListAction};
use crate::config::DEFAULT_PAC_PROXY;

const PROXY_VAR: &str = "PROXY";
const DEFAULT_VAR: &str = "DEFAULT";
const RULES_BEGIN: &str = "//-- AUTO-GENERATED RULES, DO NOT MODIFY!";
const RULES_END: &str = "//-- END OF AUTO-GENERATED RULES";
const RULE_SEPARATOR: &str = "\r\n\t";

/// Builds `FindProxyForURL` scripts.
#[derive(Debug, Clone)]
pub struct PacGenerator {
    proxy: String,
    custom_pre: String,
    custom_post: String,
}

impl Default for PacGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PAC_PROXY)
    }
}

impl PacGenerator {
    /// `proxy` is the `host:port` blocked URLs are sent to.
    pub fn new(proxy: &str) -> Self {
        Self {
            proxy: proxy.to_string(),
            custom_pre: String::new(),
            custom_post: String::new(),
        }
    }

    /// Extra code placed before the generated rules.
    pub fn with_custom_pre(mut self, code: &str) -> Self {
        self.custom_pre = code.to_string();
        self
    }

    /// Extra code placed after the generated rules.
    pub fn with_custom_post(mut self, code: &str) -> Self {
        self.custom_post = code.to_string();
        self
    }

    /// Render the script. Allow entries come first so they win over blocks.
    pub fn generate(&self, list: &AdBlockList, source_url: &str, last_update: &str) -> String {
        let rules: Vec<String> = list
            .entries()
            .map(|entry| {
                let var = match entry.action() {
                    ListAction::Allow => DEFAULT_VAR,
                    ListAction::Block => PROXY_VAR,
                };
                format!("if(/{}/i.test(url)) return {};", entry.script_expr(), var)
            })
            .collect();

        let mut script = String::new();
        script.push_str("/*\n");
        script.push_str(" * Proxy Auto-Config file generated by autoproxy2pac\n");
        script.push_str(&format!(" *  Rule source: {}\n", source_url));
        script.push_str(&format!(" *  Last update: {}\n", last_update));
        script.push_str(" */\n");
        script.push_str("function FindProxyForURL(url, host) {\n");
        script.push_str(&format!("\tvar {} = \"PROXY {}\";\n", PROXY_VAR, self.proxy));
        script.push_str(&format!("\tvar {} = \"DIRECT\";\n", DEFAULT_VAR));
        script.push_str(&format!("\t{}\n", self.custom_pre));
        script.push_str(&format!("\t{}\n", RULES_BEGIN));
        script.push_str(&format!("\t{}\n", rules.join(RULE_SEPARATOR)));
        script.push_str(&format!("\t{}\n", RULES_END));
        script.push_str(&format!("\t{}\n", self.custom_post));
        script.push_str(&format!("\treturn {};\n", DEFAULT_VAR));
        script.push('}');
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let list = AdBlockList::parse("[AutoProxy 0.2.9]\n||blocked.com\n@@||ok.blocked.com\n");
        let pac = PacGenerator::new("127.0.0.1:8080").generate(
            &list,
            "https://example.com/gfwlist.txt",
            "Wed, 21 Oct 2015 07:28:00 GMT",
        );

        assert!(pac.contains(" *  Rule source: https://example.com/gfwlist.txt\n"));
        assert!(pac.contains("var PROXY = \"PROXY 127.0.0.1:8080\";"));
        assert!(pac.contains("var DEFAULT = \"DIRECT\";"));
        assert!(pac.ends_with("\treturn DEFAULT;\n}"));

        let allow = pac.find("return DEFAULT;\r\n\t").unwrap();
        let block = pac.find(r"blocked\.com/i.test(url)) return PROXY;").unwrap();
        assert!(allow < block);
        assert!(pac.contains(r"if(/^[\w\-]+:\/+(?!\/)(?:[^\/]+\.)?ok\.blocked\.com/i.test(url)) return DEFAULT;"));
    }

    #[test]
    fn test_script_only_lines_are_emitted() {
        let list = AdBlockList::parse("||a.com\n/^https?:\\/\\/(?!www\\.)[^\\/]+\\.b\\.com/\n");
        assert_eq!(list.len(), 2);

        let pac = PacGenerator::default().generate(&list, "", "");
        assert!(pac.contains(r"if(/^https?:\/\/(?!www\.)[^\/]+\.b\.com/i.test(url)) return PROXY;"));
        assert!(pac.contains(r"a\.com/i.test(url)) return PROXY;"));
    }

    #[test]
    fn test_custom_code_and_empty_list() {
        let pac = PacGenerator::default()
            .with_custom_pre("if (isPlainHostName(host)) return DEFAULT;")
            .with_custom_post("if (shExpMatch(host, \"*.lan\")) return DEFAULT;")
            .generate(&AdBlockList::new(), "", "");
        assert!(pac.contains("\tif (isPlainHostName(host)) return DEFAULT;\n"));
        assert!(pac.contains(&format!("{}\n\tif (shExpMatch(host, \"*.lan\")) return DEFAULT;\n", RULES_END)));
        assert!(pac.contains(&format!("PROXY {}", DEFAULT_PAC_PROXY)));
        assert!(pac.contains(&format!("\t{}\n\t\n\t{}", RULES_BEGIN, RULES_END)));
    }
}
