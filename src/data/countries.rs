//! Embedded ISO 3166-1 country table and fuzzy name search.
//!
//! Holds every officially assigned alpha-2 code with its ISO short name and
//! common variants. Kosovo has no ISO 3166 code and is absent.

pub struct Country {
    pub alpha_2: &'static str,
    pub alpha_3: &'static str,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

const fn country(
    alpha_2: &'static str,
    alpha_3: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
) -> Country {
    Country {
        alpha_2,
        alpha_3,
        name,
        aliases,
    }
}

pub const COUNTRIES: &[Country] = &[
    country("AD", "AND", "Andorra", &["Principality of Andorra"]),
    country("AE", "ARE", "United Arab Emirates", &["UAE"]),
    country("AF", "AFG", "Afghanistan", &[]),
    country("AG", "ATG", "Antigua and Barbuda", &[]),
    country("AI", "AIA", "Anguilla", &[]),
    country("AL", "ALB", "Albania", &["Republic of Albania"]),
    country("AM", "ARM", "Armenia", &["Republic of Armenia"]),
    country("AO", "AGO", "Angola", &["Republic of Angola"]),
    country("AQ", "ATA", "Antarctica", &[]),
    country("AR", "ARG", "Argentina", &["Argentine Republic"]),
    country("AS", "ASM", "American Samoa", &[]),
    country("AT", "AUT", "Austria", &["Republic of Austria"]),
    country("AU", "AUS", "Australia", &[]),
    country("AW", "ABW", "Aruba", &[]),
    country("AX", "ALA", "Åland Islands", &[]),
    country("AZ", "AZE", "Azerbaijan", &["Republic of Azerbaijan"]),
    country("BA", "BIH", "Bosnia and Herzegovina", &["Bosnia", "Bosnia-Herzegovina"]),
    country("BB", "BRB", "Barbados", &[]),
    country("BD", "BGD", "Bangladesh", &["People's Republic of Bangladesh"]),
    country("BE", "BEL", "Belgium", &["Kingdom of Belgium"]),
    country("BF", "BFA", "Burkina Faso", &[]),
    country("BG", "BGR", "Bulgaria", &["Republic of Bulgaria"]),
    country("BH", "BHR", "Bahrain", &["Kingdom of Bahrain"]),
    country("BI", "BDI", "Burundi", &["Republic of Burundi"]),
    country("BJ", "BEN", "Benin", &["Republic of Benin"]),
    country("BL", "BLM", "Saint Barthélemy", &[]),
    country("BM", "BMU", "Bermuda", &[]),
    country("BN", "BRN", "Brunei Darussalam", &["Brunei"]),
    country("BO", "BOL", "Bolivia", &["Bolivia, Plurinational State of", "Plurinational State of Bolivia"]),
    country("BQ", "BES", "Bonaire, Sint Eustatius and Saba", &[]),
    country("BR", "BRA", "Brazil", &["Federative Republic of Brazil"]),
    country("BS", "BHS", "Bahamas", &["Commonwealth of the Bahamas"]),
    country("BT", "BTN", "Bhutan", &["Kingdom of Bhutan"]),
    country("BV", "BVT", "Bouvet Island", &[]),
    country("BW", "BWA", "Botswana", &["Republic of Botswana"]),
    country("BY", "BLR", "Belarus", &["Republic of Belarus"]),
    country("BZ", "BLZ", "Belize", &[]),
    country("CA", "CAN", "Canada", &[]),
    country("CC", "CCK", "Cocos (Keeling) Islands", &[]),
    country("CD", "COD", "Congo, The Democratic Republic of the", &["Democratic Republic of the Congo", "DR Congo"]),
    country("CF", "CAF", "Central African Republic", &[]),
    country("CG", "COG", "Congo", &["Republic of the Congo"]),
    country("CH", "CHE", "Switzerland", &["Swiss Confederation"]),
    country("CI", "CIV", "Côte d'Ivoire", &["Ivory Coast", "Republic of Côte d'Ivoire"]),
    country("CK", "COK", "Cook Islands", &[]),
    country("CL", "CHL", "Chile", &["Republic of Chile"]),
    country("CM", "CMR", "Cameroon", &["Republic of Cameroon"]),
    country("CN", "CHN", "China", &["People's Republic of China"]),
    country("CO", "COL", "Colombia", &["Republic of Colombia"]),
    country("CR", "CRI", "Costa Rica", &["Republic of Costa Rica"]),
    country("CU", "CUB", "Cuba", &["Republic of Cuba"]),
    country("CV", "CPV", "Cabo Verde", &["Cape Verde", "Republic of Cabo Verde"]),
    country("CW", "CUW", "Curaçao", &[]),
    country("CX", "CXR", "Christmas Island", &[]),
    country("CY", "CYP", "Cyprus", &["Republic of Cyprus"]),
    country("CZ", "CZE", "Czechia", &["Czech Republic"]),
    country("DE", "DEU", "Germany", &["Federal Republic of Germany"]),
    country("DJ", "DJI", "Djibouti", &["Republic of Djibouti"]),
    country("DK", "DNK", "Denmark", &["Kingdom of Denmark"]),
    country("DM", "DMA", "Dominica", &["Commonwealth of Dominica"]),
    country("DO", "DOM", "Dominican Republic", &[]),
    country("DZ", "DZA", "Algeria", &["People's Democratic Republic of Algeria"]),
    country("EC", "ECU", "Ecuador", &["Republic of Ecuador"]),
    country("EE", "EST", "Estonia", &["Republic of Estonia"]),
    country("EG", "EGY", "Egypt", &["Arab Republic of Egypt"]),
    country("EH", "ESH", "Western Sahara", &[]),
    country("ER", "ERI", "Eritrea", &["State of Eritrea"]),
    country("ES", "ESP", "Spain", &["Kingdom of Spain"]),
    country("ET", "ETH", "Ethiopia", &["Federal Democratic Republic of Ethiopia"]),
    country("FI", "FIN", "Finland", &["Republic of Finland"]),
    country("FJ", "FJI", "Fiji", &["Republic of Fiji"]),
    country("FK", "FLK", "Falkland Islands (Malvinas)", &[]),
    country("FM", "FSM", "Micronesia, Federated States of", &["Micronesia", "Federated States of Micronesia"]),
    country("FO", "FRO", "Faroe Islands", &[]),
    country("FR", "FRA", "France", &["French Republic"]),
    country("GA", "GAB", "Gabon", &["Gabonese Republic"]),
    country("GB", "GBR", "United Kingdom", &["United Kingdom of Great Britain and Northern Ireland", "Great Britain", "UK"]),
    country("GD", "GRD", "Grenada", &[]),
    country("GE", "GEO", "Georgia", &[]),
    country("GF", "GUF", "French Guiana", &[]),
    country("GG", "GGY", "Guernsey", &[]),
    country("GH", "GHA", "Ghana", &["Republic of Ghana"]),
    country("GI", "GIB", "Gibraltar", &[]),
    country("GL", "GRL", "Greenland", &[]),
    country("GM", "GMB", "Gambia", &["Republic of the Gambia"]),
    country("GN", "GIN", "Guinea", &["Republic of Guinea"]),
    country("GP", "GLP", "Guadeloupe", &[]),
    country("GQ", "GNQ", "Equatorial Guinea", &["Republic of Equatorial Guinea"]),
    // Eurostat reports Greece under "EL"; the ISO code is GR.
    country("GR", "GRC", "Greece", &["Hellenic Republic"]),
    country("GS", "SGS", "South Georgia and the South Sandwich Islands", &[]),
    country("GT", "GTM", "Guatemala", &["Republic of Guatemala"]),
    country("GU", "GUM", "Guam", &[]),
    country("GW", "GNB", "Guinea-Bissau", &["Republic of Guinea-Bissau"]),
    country("GY", "GUY", "Guyana", &["Republic of Guyana"]),
    country("HK", "HKG", "Hong Kong", &[]),
    country("HM", "HMD", "Heard Island and McDonald Islands", &[]),
    country("HN", "HND", "Honduras", &["Republic of Honduras"]),
    country("HR", "HRV", "Croatia", &["Republic of Croatia", "Hrvatska"]),
    country("HT", "HTI", "Haiti", &["Republic of Haiti"]),
    country("HU", "HUN", "Hungary", &[]),
    country("ID", "IDN", "Indonesia", &["Republic of Indonesia"]),
    country("IE", "IRL", "Ireland", &[]),
    country("IL", "ISR", "Israel", &["State of Israel"]),
    country("IM", "IMN", "Isle of Man", &[]),
    country("IN", "IND", "India", &["Republic of India"]),
    country("IO", "IOT", "British Indian Ocean Territory", &[]),
    country("IQ", "IRQ", "Iraq", &["Republic of Iraq"]),
    country("IR", "IRN", "Iran", &["Iran, Islamic Republic of", "Islamic Republic of Iran"]),
    country("IS", "ISL", "Iceland", &["Republic of Iceland"]),
    country("IT", "ITA", "Italy", &["Italian Republic"]),
    country("JE", "JEY", "Jersey", &[]),
    country("JM", "JAM", "Jamaica", &[]),
    country("JO", "JOR", "Jordan", &["Hashemite Kingdom of Jordan"]),
    country("JP", "JPN", "Japan", &[]),
    country("KE", "KEN", "Kenya", &["Republic of Kenya"]),
    country("KG", "KGZ", "Kyrgyzstan", &["Kyrgyz Republic"]),
    country("KH", "KHM", "Cambodia", &["Kingdom of Cambodia"]),
    country("KI", "KIR", "Kiribati", &["Republic of Kiribati"]),
    country("KM", "COM", "Comoros", &["Union of the Comoros"]),
    country("KN", "KNA", "Saint Kitts and Nevis", &[]),
    country("KP", "PRK", "Korea, Democratic People's Republic of", &["North Korea", "Democratic People's Republic of Korea"]),
    country("KR", "KOR", "Korea, Republic of", &["South Korea", "Republic of Korea"]),
    country("KW", "KWT", "Kuwait", &["State of Kuwait"]),
    country("KY", "CYM", "Cayman Islands", &[]),
    country("KZ", "KAZ", "Kazakhstan", &["Republic of Kazakhstan"]),
    country("LA", "LAO", "Lao People's Democratic Republic", &["Laos"]),
    country("LB", "LBN", "Lebanon", &["Lebanese Republic"]),
    country("LC", "LCA", "Saint Lucia", &[]),
    country("LI", "LIE", "Liechtenstein", &["Principality of Liechtenstein"]),
    country("LK", "LKA", "Sri Lanka", &["Democratic Socialist Republic of Sri Lanka"]),
    country("LR", "LBR", "Liberia", &["Republic of Liberia"]),
    country("LS", "LSO", "Lesotho", &["Kingdom of Lesotho"]),
    country("LT", "LTU", "Lithuania", &["Republic of Lithuania"]),
    country("LU", "LUX", "Luxembourg", &["Grand Duchy of Luxembourg"]),
    country("LV", "LVA", "Latvia", &["Republic of Latvia"]),
    country("LY", "LBY", "Libya", &["State of Libya"]),
    country("MA", "MAR", "Morocco", &["Kingdom of Morocco"]),
    country("MC", "MCO", "Monaco", &["Principality of Monaco"]),
    country("MD", "MDA", "Moldova", &["Moldova, Republic of", "Republic of Moldova"]),
    country("ME", "MNE", "Montenegro", &[]),
    country("MF", "MAF", "Saint Martin (French part)", &[]),
    country("MG", "MDG", "Madagascar", &["Republic of Madagascar"]),
    country("MH", "MHL", "Marshall Islands", &["Republic of the Marshall Islands"]),
    country("MK", "MKD", "North Macedonia", &["Republic of North Macedonia", "Macedonia"]),
    country("ML", "MLI", "Mali", &["Republic of Mali"]),
    country("MM", "MMR", "Myanmar", &["Republic of the Union of Myanmar", "Burma"]),
    country("MN", "MNG", "Mongolia", &[]),
    country("MO", "MAC", "Macao", &["Macau"]),
    country("MP", "MNP", "Northern Mariana Islands", &[]),
    country("MQ", "MTQ", "Martinique", &[]),
    country("MR", "MRT", "Mauritania", &["Islamic Republic of Mauritania"]),
    country("MS", "MSR", "Montserrat", &[]),
    country("MT", "MLT", "Malta", &["Republic of Malta"]),
    country("MU", "MUS", "Mauritius", &["Republic of Mauritius"]),
    country("MV", "MDV", "Maldives", &["Republic of Maldives"]),
    country("MW", "MWI", "Malawi", &["Republic of Malawi"]),
    country("MX", "MEX", "Mexico", &["United Mexican States"]),
    country("MY", "MYS", "Malaysia", &[]),
    country("MZ", "MOZ", "Mozambique", &["Republic of Mozambique"]),
    country("NA", "NAM", "Namibia", &["Republic of Namibia"]),
    country("NC", "NCL", "New Caledonia", &[]),
    country("NE", "NER", "Niger", &["Republic of the Niger"]),
    country("NF", "NFK", "Norfolk Island", &[]),
    country("NG", "NGA", "Nigeria", &["Federal Republic of Nigeria"]),
    country("NI", "NIC", "Nicaragua", &["Republic of Nicaragua"]),
    country("NL", "NLD", "Netherlands", &["Kingdom of the Netherlands", "Holland"]),
    country("NO", "NOR", "Norway", &["Kingdom of Norway"]),
    country("NP", "NPL", "Nepal", &["Federal Democratic Republic of Nepal"]),
    country("NR", "NRU", "Nauru", &["Republic of Nauru"]),
    country("NU", "NIU", "Niue", &[]),
    country("NZ", "NZL", "New Zealand", &[]),
    country("OM", "OMN", "Oman", &["Sultanate of Oman"]),
    country("PA", "PAN", "Panama", &["Republic of Panama"]),
    country("PE", "PER", "Peru", &["Republic of Peru"]),
    country("PF", "PYF", "French Polynesia", &[]),
    country("PG", "PNG", "Papua New Guinea", &["Independent State of Papua New Guinea"]),
    country("PH", "PHL", "Philippines", &["Republic of the Philippines"]),
    country("PK", "PAK", "Pakistan", &["Islamic Republic of Pakistan"]),
    country("PL", "POL", "Poland", &["Republic of Poland"]),
    country("PM", "SPM", "Saint Pierre and Miquelon", &[]),
    country("PN", "PCN", "Pitcairn", &[]),
    country("PR", "PRI", "Puerto Rico", &[]),
    country("PS", "PSE", "Palestine, State of", &["Palestine", "State of Palestine"]),
    country("PT", "PRT", "Portugal", &["Portuguese Republic"]),
    country("PW", "PLW", "Palau", &["Republic of Palau"]),
    country("PY", "PRY", "Paraguay", &["Republic of Paraguay"]),
    country("QA", "QAT", "Qatar", &["State of Qatar"]),
    country("RE", "REU", "Réunion", &[]),
    country("RO", "ROU", "Romania", &[]),
    country("RS", "SRB", "Serbia", &["Republic of Serbia"]),
    country("RU", "RUS", "Russian Federation", &["Russia"]),
    country("RW", "RWA", "Rwanda", &["Rwandese Republic"]),
    country("SA", "SAU", "Saudi Arabia", &["Kingdom of Saudi Arabia"]),
    country("SB", "SLB", "Solomon Islands", &[]),
    country("SC", "SYC", "Seychelles", &["Republic of Seychelles"]),
    country("SD", "SDN", "Sudan", &["Republic of the Sudan"]),
    country("SE", "SWE", "Sweden", &["Kingdom of Sweden"]),
    country("SG", "SGP", "Singapore", &["Republic of Singapore"]),
    country("SH", "SHN", "Saint Helena, Ascension and Tristan da Cunha", &["Saint Helena"]),
    country("SI", "SVN", "Slovenia", &["Republic of Slovenia"]),
    country("SJ", "SJM", "Svalbard and Jan Mayen", &[]),
    country("SK", "SVK", "Slovakia", &["Slovak Republic"]),
    country("SL", "SLE", "Sierra Leone", &["Republic of Sierra Leone"]),
    country("SM", "SMR", "San Marino", &["Republic of San Marino"]),
    country("SN", "SEN", "Senegal", &["Republic of Senegal"]),
    country("SO", "SOM", "Somalia", &["Federal Republic of Somalia"]),
    country("SR", "SUR", "Suriname", &["Republic of Suriname"]),
    country("SS", "SSD", "South Sudan", &["Republic of South Sudan"]),
    country("ST", "STP", "Sao Tome and Principe", &["Democratic Republic of Sao Tome and Principe"]),
    country("SV", "SLV", "El Salvador", &["Republic of El Salvador"]),
    country("SX", "SXM", "Sint Maarten (Dutch part)", &[]),
    country("SY", "SYR", "Syrian Arab Republic", &["Syria"]),
    country("SZ", "SWZ", "Eswatini", &["Kingdom of Eswatini", "Swaziland"]),
    country("TC", "TCA", "Turks and Caicos Islands", &[]),
    country("TD", "TCD", "Chad", &["Republic of Chad"]),
    country("TF", "ATF", "French Southern Territories", &[]),
    country("TG", "TGO", "Togo", &["Togolese Republic"]),
    country("TH", "THA", "Thailand", &["Kingdom of Thailand"]),
    country("TJ", "TJK", "Tajikistan", &["Republic of Tajikistan"]),
    country("TK", "TKL", "Tokelau", &[]),
    country("TL", "TLS", "Timor-Leste", &["East Timor", "Democratic Republic of Timor-Leste"]),
    country("TM", "TKM", "Turkmenistan", &[]),
    country("TN", "TUN", "Tunisia", &["Republic of Tunisia"]),
    country("TO", "TON", "Tonga", &["Kingdom of Tonga"]),
    country("TR", "TUR", "Türkiye", &["Turkey", "Republic of Türkiye"]),
    country("TT", "TTO", "Trinidad and Tobago", &["Republic of Trinidad and Tobago"]),
    country("TV", "TUV", "Tuvalu", &[]),
    country("TW", "TWN", "Taiwan, Province of China", &["Taiwan"]),
    country("TZ", "TZA", "Tanzania, United Republic of", &["Tanzania", "United Republic of Tanzania"]),
    country("UA", "UKR", "Ukraine", &[]),
    country("UG", "UGA", "Uganda", &["Republic of Uganda"]),
    country("UM", "UMI", "United States Minor Outlying Islands", &[]),
    country("US", "USA", "United States", &["United States of America", "USA"]),
    country("UY", "URY", "Uruguay", &["Eastern Republic of Uruguay"]),
    country("UZ", "UZB", "Uzbekistan", &["Republic of Uzbekistan"]),
    country("VA", "VAT", "Holy See (Vatican City State)", &["Vatican", "Holy See"]),
    country("VC", "VCT", "Saint Vincent and the Grenadines", &[]),
    country("VE", "VEN", "Venezuela", &["Venezuela, Bolivarian Republic of", "Bolivarian Republic of Venezuela"]),
    country("VG", "VGB", "Virgin Islands, British", &["British Virgin Islands"]),
    country("VI", "VIR", "Virgin Islands, U.S.", &["United States Virgin Islands"]),
    country("VN", "VNM", "Viet Nam", &["Vietnam", "Socialist Republic of Viet Nam"]),
    country("VU", "VUT", "Vanuatu", &["Republic of Vanuatu"]),
    country("WF", "WLF", "Wallis and Futuna", &[]),
    country("WS", "WSM", "Samoa", &["Independent State of Samoa"]),
    country("YE", "YEM", "Yemen", &["Republic of Yemen"]),
    country("YT", "MYT", "Mayotte", &[]),
    country("ZA", "ZAF", "South Africa", &["Republic of South Africa"]),
    country("ZM", "ZMB", "Zambia", &["Republic of Zambia"]),
    country("ZW", "ZWE", "Zimbabwe", &["Republic of Zimbabwe"]),
];

/// Lowercases, strips parenthesised notes and apostrophes, folds common
/// diacritics, then collapses everything that is not a letter or digit to single spaces.
pub fn normalize_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth = 0usize;
    for ch in input.chars() {
        match ch {
            '(' => depth += 1,
            '\'' | '’' => {}
            ')' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ => {
                for folded in fold(ch).to_lowercase() {
                    out.push(if folded.is_alphanumeric() { folded } else { ' ' });
                }
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        'š' | 'Š' => 's',
        'ž' | 'Ž' => 'z',
        'č' | 'Č' => 'c',
        other => other,
    }
}

fn names(country: &Country) -> impl Iterator<Item = &'static str> {
    std::iter::once(country.name).chain(country.aliases.iter().copied())
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    let padded = format!(" {} ", haystack);
    padded.contains(&format!(" {} ", needle))
}

/// Finds the best matching country for a free-text name.
///
/// Exact matches on the official name, an alias or the alpha-3 code win.
/// Otherwise the longest known name found as a whole-word run inside the
/// input is taken, so "Germany former territory" still matches Germany.
pub fn search(input: &str) -> Option<&'static Country> {
    let query = normalize_name(input);
    if query.is_empty() {
        return None;
    }

    let exact = COUNTRIES.iter().find(|c| {
        c.alpha_3.eq_ignore_ascii_case(&query)
            || names(c).any(|n| normalize_name(n) == query)
    });
    if exact.is_some() {
        return exact;
    }

    COUNTRIES
        .iter()
        .flat_map(|c| names(c).map(move |n| (c, normalize_name(n))))
        .filter(|(_, name)| name.len() >= 4 && contains_words(&query, name))
        .max_by_key(|(_, name)| name.len())
        .map(|(c, _)| c)
}
