use std::collections::HashMap;

/// Canonical (lowercase) place names and misspellings users commonly type for them
pub const KNOWN_MISSPELLINGS: &[(&str, &[&str])] = &[
    ("philadelphia", &["filadelfia", "philadelfia", "philidelphia", "philladelphia", "phildelphia", "philadephia"]),
    ("cincinnati", &["cincinatti", "cincinati", "cinncinati", "cinncinnati", "sincinnati"]),
    ("albuquerque", &["albequerque", "albuquerqe", "alburquerque", "albuqerque", "albaquerque"]),
    ("pittsburgh", &["pittsburg", "pitsburgh", "pitsburg", "pittsburh"]),
    ("chicago", &["chicaco", "chigago", "shicago", "chcago"]),
    ("massachusetts", &["massachusets", "massachussetts", "masachusetts", "massachussets"]),
    ("mississippi", &["missisippi", "mississipi", "misissippi", "missisipi"]),
    ("tucson", &["tuscon", "tucsan", "tuson"]),
    ("louisville", &["louisvile", "louiseville", "lousville"]),
    ("milwaukee", &["milwakee", "milwaukie", "milwuakee"]),
    ("sacramento", &["sacremento", "sacramenta", "sacromento"]),
    ("san francisco", &["san fransisco", "san francsico", "san fransico", "sanfrancisco"]),
    ("los angeles", &["los angelas", "los angelos", "los angles", "losangeles"]),
    ("new york", &["new yourk", "newyork", "new yrok", "nwe york"]),
    ("honolulu", &["honalulu", "honolullu", "honululu"]),
    ("worcester", &["worchester", "worcestor"]),
    ("edinburgh", &["edinborough", "edinburg", "edinbrugh"]),
    ("amsterdam", &["amsterdamn", "amsterdm", "amstredam"]),
    ("barcelona", &["barcellona", "barselona", "barcalona"]),
    ("copenhagen", &["copenhagan", "kopenhagen", "copenhaagen"]),
    ("reykjavik", &["reykavik", "reykjavick", "rejkjavik"]),
    ("marseille", &["marseilles", "marsaille", "marsielle"]),
    ("jerusalem", &["jerusalam", "jeruslem", "jerusalim"]),
    ("singapore", &["singapoore", "singpore", "singapur"]),
    ("johannesburg", &["johannesberg", "johanesburg", "johannisburg"]),
    ("montreal", &["montrial", "monreal", "montreall"]),
    ("guadalajara", &["guadalahara", "guadalajra", "guadelajara"]),
    ("brisbane", &["brisbain", "brisban", "brisbaine"]),
];

/// Lookup table from misspelled variant to canonical name
pub fn variant_index() -> HashMap<String, String> {
    KNOWN_MISSPELLINGS
        .iter()
        .flat_map(|(canonical, variants)| {
            variants
                .iter()
                .map(move |variant| (variant.to_string(), canonical.to_string()))
        })
        .collect()
}
