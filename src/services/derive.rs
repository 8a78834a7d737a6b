//! Heuristic defaults for catalog packages whose metadata is incomplete.
//!
//! Every table here is keyed by the policy id's domain prefix (`gdpr.x` →
//! `gdpr`) and its short part. Explicit metadata always wins; these helpers
//! only fill placeholders.

use regex::Regex;
use std::sync::LazyLock;

const ACRONYMS: &[&str] = &[
    "api", "uk", "us", "eu", "gdpr", "hipaa", "pci", "kyc", "aml", "mfa", "sbom", "fhir", "onc",
];

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*$|^<[^>]*>$|^(?i:n/?a|unknown)$").expect("placeholder regex must compile")
});

/// `None`, blank, `<...>`, `n/a`, `na`, `unknown`.
pub fn is_placeholder(val: Option<&str>) -> bool {
    match val {
        None => true,
        Some(s) => PLACEHOLDER_RE.is_match(s.trim()),
    }
}

pub fn split_id(pid: &str) -> (&str, &str) {
    pid.split_once('.').unwrap_or((pid, ""))
}

fn capitalize(t: &str) -> String {
    let mut chars = t.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn humanize_name(pid: &str) -> String {
    let short = match pid.split_once('.') {
        Some((_, s)) => s,
        None => pid,
    };
    let words: Vec<String> = short
        .split(['_', '-', '/'])
        .filter(|t| !t.is_empty())
        .map(|t| {
            if ACRONYMS.contains(&t.to_lowercase().as_str()) {
                t.to_uppercase()
            } else {
                capitalize(t)
            }
        })
        .collect();
    if words.is_empty() {
        pid.to_string()
    } else {
        words.join(" ")
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

/// Standard and version for a package. Kept as-is when both are real values.
pub fn derive_standard_version(
    pid: &str,
    std: Option<&str>,
    ver: Option<&str>,
) -> (String, String) {
    if let (Some(s), Some(v)) = (std, ver) {
        if !is_placeholder(Some(s)) && !is_placeholder(Some(v)) {
            return pair(s, v);
        }
    }
    let (domain, short) = split_id(pid);
    let s = short.to_lowercase();
    let has = |k: &str| s.contains(k);

    if domain == "gdpr" || has("gdpr") {
        return pair("GDPR", "2016/679");
    }
    if domain == "pci" || has("pci_") {
        return pair("PCI DSS", "4.0");
    }
    if domain == "k8s" || std.unwrap_or("").to_lowercase().contains("kubernetes") {
        return pair("Kubernetes", "1.x");
    }
    if domain == "aml" || has("aml") {
        return pair("EU AMLD", "5/6");
    }
    let table: &[(&str, &str, &str)] = match domain {
        "fintech" => &[
            ("psd2", "PSD2", "2015/2366"),
            ("ob_", "Open Banking (UK)", "current"),
            ("open_banking", "Open Banking (UK)", "current"),
            ("fapi", "FAPI", "current"),
        ],
        "medtech" => &[
            ("iso_27001", "ISO/IEC 27001", "2022"),
            ("iso_14971", "ISO 14971", "2019"),
            ("iso_13485", "ISO 13485", "2016"),
            ("iec_62304", "IEC 62304", "2006"),
            ("iec_62366", "IEC 62366-1", "2015"),
            ("eu_mdr", "EU MDR", "2017/745"),
            ("eu_ivdr", "EU IVDR", "2017/746"),
            ("hipaa", "HIPAA", "Security Rule"),
            ("hitech", "HITECH Act", "2009"),
            ("onc_", "ONC Cures Act", "Cures Update"),
            ("dicom", "DICOM", "current"),
            ("uk_dtac", "NHS DTAC", "current"),
        ],
        "edtech" => &[
            ("ferpa", "FERPA", "current"),
            ("coppa", "COPPA", "current"),
            ("ppra", "PPRA", "current"),
            ("edlaw2d", "NY Education Law 2-d", "current"),
            ("sopipa", "SOPIPA (CA)", "current"),
        ],
        _ => &[],
    };
    if let Some((_, n, v)) = table.iter().find(|(k, _, _)| has(k)) {
        return pair(n, v);
    }
    if domain == "legaltech" {
        if let Some(found) = legaltech_standard(&s) {
            return found;
        }
    }
    (domain.to_uppercase(), "current".to_string())
}

fn legaltech_standard(s: &str) -> Option<(String, String)> {
    let has = |k: &str| s.contains(k);
    let name = if has("ccpa") && has("cpra") {
        "CCPA/CPRA"
    } else if has("cpra") {
        "CPRA"
    } else if has("ccpa") {
        "CCPA"
    } else if has("pdpa_sg") || (has("pdpa") && has("sg")) {
        "PDPA (Singapore)"
    } else if has("pipl_cn") || (has("pipl") && has("cn")) {
        "PIPL (China)"
    } else if has("app") && (has("au_") || has("australia")) {
        "Australian Privacy Act (APPs)"
    } else if has("law25") {
        "Quebec Law 25"
    } else if has("lgpd") {
        "LGPD (Brazil)"
    } else if has("pdpl") {
        "PDPL (UAE)"
    } else if has("kvkk") {
        "KVKK (Turkey)"
    } else if has("pipeda") {
        "PIPEDA (Canada)"
    } else if has("fadp") {
        "FADP (Switzerland)"
    } else {
        return None;
    };
    Some(pair(name, "current"))
}

pub fn derive_owner(pid: &str) -> String {
    match split_id(pid).0 {
        "k8s" => "platform-security".to_string(),
        _ => "compliance".to_string(),
    }
}

fn standard_slug(std_name: &str) -> Option<&'static str> {
    let s = std_name.to_lowercase();
    let table: &[(&[&str], &str)] = &[
        (&["gdpr"], "gdpr"),
        (&["pci"], "pci"),
        (&["hipaa"], "hipaa"),
        (&["psd2"], "psd2"),
        (&["open banking"], "open-banking"),
        (&["fapi"], "fapi"),
        (&["iso/iec 27001", "iso 27001"], "iso-27001"),
        (&["iso 13485"], "iso-13485"),
        (&["iso 14971"], "iso-14971"),
        (&["iec 62304"], "iec-62304"),
        (&["iec 62366"], "iec-62366"),
        (&["eu mdr"], "mdr"),
        (&["eu ivdr"], "ivdr"),
        (&["kubernetes"], "kubernetes"),
    ];
    table
        .iter()
        .find(|(keys, _)| keys.iter().any(|k| s.contains(k)))
        .map(|(_, slug)| *slug)
}

/// Domain token, engine tokens, standard slug and thematic hints; sorted, unique.
pub fn derive_tags(pid: &str, framework: Option<&str>, std_name: Option<&str>) -> Vec<String> {
    let (domain, short) = split_id(pid);
    let mut tags: Vec<&str> = Vec::new();
    let domain_tag = domain.to_lowercase();
    match framework {
        Some("kyverno") => tags.extend(["kubernetes", "kyverno"]),
        Some("gatekeeper") => {
            if domain == "k8s" {
                tags.push("kubernetes");
            }
            tags.extend(["gatekeeper", "rego"]);
        }
        _ => {}
    }
    if let Some(slug) = std_name.filter(|s| !s.is_empty()).and_then(standard_slug) {
        tags.push(slug);
    }
    let ss = short.to_lowercase();
    let any = |keys: &[&str]| keys.iter().any(|k| ss.contains(k));
    if any(&["aml", "sanctions", "pep", "kyc", "watchlist", "risk", "monitoring"]) {
        tags.push("aml");
    }
    if any(&["auth", "mfa", "oauth", "jwt", "mtls", "3ds", "sca", "tpp"]) {
        tags.push("security");
    }
    if domain == "k8s" {
        if any(&["hostnetwork", "network"]) {
            tags.push("network");
        }
        if any(&["hostpath", "storage", "volume"]) {
            tags.push("storage");
        }
        if any(&["image", "supply", "pullpolicy", "latest"]) {
            tags.push("supply-chain");
        }
    }
    let mut out: Vec<String> = tags.into_iter().map(str::to_string).collect();
    out.push(domain_tag);
    out.retain(|t| !t.is_empty());
    out.sort();
    out.dedup();
    out
}

/// Engine implied by source paths.
pub fn framework_from_paths(paths: &[String]) -> Option<&'static str> {
    for p in paths {
        if p.contains("/kyverno/") || p.starts_with("addons/kyverno") {
            return Some("kyverno");
        }
        if p.contains("k8s-gatekeeper") || p.ends_with(".rego") {
            return Some("gatekeeper");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_cover_brackets_and_unknowns() {
        for v in ["", "  ", "<fill me>", "n/a", "NA", "Unknown"] {
            assert!(is_placeholder(Some(v)), "{v:?}");
        }
        assert!(is_placeholder(None));
        assert!(!is_placeholder(Some("GDPR")));
    }

    #[test]
    fn humanize_uppercases_acronyms() {
        assert_eq!(humanize_name("gdpr.eu_data-transfer"), "EU Data Transfer");
        assert_eq!(humanize_name("medtech.onc_api_access"), "ONC API Access");
        assert_eq!(humanize_name("solo"), "Solo");
    }

    #[test]
    fn explicit_standard_and_version_are_kept() {
        assert_eq!(
            derive_standard_version("gdpr.x", Some("Custom"), Some("2")),
            ("Custom".to_string(), "2".to_string())
        );
    }

    #[test]
    fn domain_tables_fill_placeholders() {
        assert_eq!(
            derive_standard_version("gdpr.x", Some("<std>"), None).0,
            "GDPR"
        );
        assert_eq!(
            derive_standard_version("medtech.eu_mdr_vigilance", None, None),
            ("EU MDR".to_string(), "2017/745".to_string())
        );
        assert_eq!(
            derive_standard_version("legaltech.ccpa_cpra_optout", None, None).0,
            "CCPA/CPRA"
        );
        assert_eq!(
            derive_standard_version("betting.limits", None, None),
            ("BETTING".to_string(), "current".to_string())
        );
    }

    #[test]
    fn tags_are_sorted_and_unique() {
        let tags = derive_tags("k8s.no_hostnetwork", Some("gatekeeper"), Some("Kubernetes"));
        assert_eq!(tags, vec!["gatekeeper", "k8s", "kubernetes", "network", "rego"]);
        let tags = derive_tags("gdpr.consent", Some("gatekeeper"), Some("GDPR"));
        assert_eq!(tags, vec!["gatekeeper", "gdpr", "rego"]);
    }

    #[test]
    fn owner_defaults_to_compliance() {
        assert_eq!(derive_owner("k8s.x"), "platform-security");
        assert_eq!(derive_owner("gdpr.x"), "compliance");
    }
}
