//! Country and language reference data
//!
//! Both tables are sorted by code and searched with `binary_search_by_key`.
//! Language codes are ISO 639-1; the language listed for a country is its
//! most widely used official language.
//!
//! Names are English. A display locale with a translation table (currently
//! French) overrides the names it covers and falls back to English for the
//! rest.

use super::country::CountryCode;

/// `(country code, English name, primary language code)`
const COUNTRIES: &[(&str, &str, &str)] = &[
    ("AD", "Andorra", "ca"),
    ("AE", "United Arab Emirates", "ar"),
    ("AF", "Afghanistan", "ps"),
    ("AG", "Antigua and Barbuda", "en"),
    ("AI", "Anguilla", "en"),
    ("AL", "Albania", "sq"),
    ("AM", "Armenia", "hy"),
    ("AO", "Angola", "pt"),
    ("AQ", "Antarctica", "en"),
    ("AR", "Argentina", "es"),
    ("AS", "American Samoa", "en"),
    ("AT", "Austria", "de"),
    ("AU", "Australia", "en"),
    ("AW", "Aruba", "nl"),
    ("AX", "Åland Islands", "sv"),
    ("AZ", "Azerbaijan", "az"),
    ("BA", "Bosnia and Herzegovina", "bs"),
    ("BB", "Barbados", "en"),
    ("BD", "Bangladesh", "bn"),
    ("BE", "Belgium", "nl"),
    ("BF", "Burkina Faso", "fr"),
    ("BG", "Bulgaria", "bg"),
    ("BH", "Bahrain", "ar"),
    ("BI", "Burundi", "fr"),
    ("BJ", "Benin", "fr"),
    ("BL", "Saint Barthélemy", "fr"),
    ("BM", "Bermuda", "en"),
    ("BN", "Brunei", "ms"),
    ("BO", "Bolivia", "es"),
    ("BQ", "Caribbean Netherlands", "nl"),
    ("BR", "Brazil", "pt"),
    ("BS", "Bahamas", "en"),
    ("BT", "Bhutan", "dz"),
    ("BV", "Bouvet Island", "no"),
    ("BW", "Botswana", "en"),
    ("BY", "Belarus", "be"),
    ("BZ", "Belize", "en"),
    ("CA", "Canada", "en"),
    ("CC", "Cocos (Keeling) Islands", "en"),
    ("CD", "DR Congo", "fr"),
    ("CF", "Central African Republic", "fr"),
    ("CG", "Republic of the Congo", "fr"),
    ("CH", "Switzerland", "de"),
    ("CI", "Côte d'Ivoire", "fr"),
    ("CK", "Cook Islands", "en"),
    ("CL", "Chile", "es"),
    ("CM", "Cameroon", "fr"),
    ("CN", "China", "zh"),
    ("CO", "Colombia", "es"),
    ("CR", "Costa Rica", "es"),
    ("CU", "Cuba", "es"),
    ("CV", "Cape Verde", "pt"),
    ("CW", "Curaçao", "nl"),
    ("CX", "Christmas Island", "en"),
    ("CY", "Cyprus", "el"),
    ("CZ", "Czechia", "cs"),
    ("DE", "Germany", "de"),
    ("DJ", "Djibouti", "fr"),
    ("DK", "Denmark", "da"),
    ("DM", "Dominica", "en"),
    ("DO", "Dominican Republic", "es"),
    ("DZ", "Algeria", "ar"),
    ("EC", "Ecuador", "es"),
    ("EE", "Estonia", "et"),
    ("EG", "Egypt", "ar"),
    ("EH", "Western Sahara", "ar"),
    ("ER", "Eritrea", "ti"),
    ("ES", "Spain", "es"),
    ("ET", "Ethiopia", "am"),
    ("FI", "Finland", "fi"),
    ("FJ", "Fiji", "en"),
    ("FK", "Falkland Islands", "en"),
    ("FM", "Micronesia", "en"),
    ("FO", "Faroe Islands", "fo"),
    ("FR", "France", "fr"),
    ("GA", "Gabon", "fr"),
    ("GB", "United Kingdom", "en"),
    ("GD", "Grenada", "en"),
    ("GE", "Georgia", "ka"),
    ("GF", "French Guiana", "fr"),
    ("GG", "Guernsey", "en"),
    ("GH", "Ghana", "en"),
    ("GI", "Gibraltar", "en"),
    ("GL", "Greenland", "kl"),
    ("GM", "Gambia", "en"),
    ("GN", "Guinea", "fr"),
    ("GP", "Guadeloupe", "fr"),
    ("GQ", "Equatorial Guinea", "es"),
    ("GR", "Greece", "el"),
    ("GS", "South Georgia and the South Sandwich Islands", "en"),
    ("GT", "Guatemala", "es"),
    ("GU", "Guam", "en"),
    ("GW", "Guinea-Bissau", "pt"),
    ("GY", "Guyana", "en"),
    ("HK", "Hong Kong", "zh"),
    ("HM", "Heard Island and McDonald Islands", "en"),
    ("HN", "Honduras", "es"),
    ("HR", "Croatia", "hr"),
    ("HT", "Haiti", "fr"),
    ("HU", "Hungary", "hu"),
    ("ID", "Indonesia", "id"),
    ("IE", "Ireland", "en"),
    ("IL", "Israel", "he"),
    ("IM", "Isle of Man", "en"),
    ("IN", "India", "hi"),
    ("IO", "British Indian Ocean Territory", "en"),
    ("IQ", "Iraq", "ar"),
    ("IR", "Iran", "fa"),
    ("IS", "Iceland", "is"),
    ("IT", "Italy", "it"),
    ("JE", "Jersey", "en"),
    ("JM", "Jamaica", "en"),
    ("JO", "Jordan", "ar"),
    ("JP", "Japan", "ja"),
    ("KE", "Kenya", "sw"),
    ("KG", "Kyrgyzstan", "ky"),
    ("KH", "Cambodia", "km"),
    ("KI", "Kiribati", "en"),
    ("KM", "Comoros", "ar"),
    ("KN", "Saint Kitts and Nevis", "en"),
    ("KP", "North Korea", "ko"),
    ("KR", "South Korea", "ko"),
    ("KW", "Kuwait", "ar"),
    ("KY", "Cayman Islands", "en"),
    ("KZ", "Kazakhstan", "kk"),
    ("LA", "Laos", "lo"),
    ("LB", "Lebanon", "ar"),
    ("LC", "Saint Lucia", "en"),
    ("LI", "Liechtenstein", "de"),
    ("LK", "Sri Lanka", "si"),
    ("LR", "Liberia", "en"),
    ("LS", "Lesotho", "en"),
    ("LT", "Lithuania", "lt"),
    ("LU", "Luxembourg", "lb"),
    ("LV", "Latvia", "lv"),
    ("LY", "Libya", "ar"),
    ("MA", "Morocco", "ar"),
    ("MC", "Monaco", "fr"),
    ("MD", "Moldova", "ro"),
    ("ME", "Montenegro", "sr"),
    ("MF", "Saint Martin", "fr"),
    ("MG", "Madagascar", "mg"),
    ("MH", "Marshall Islands", "en"),
    ("MK", "North Macedonia", "mk"),
    ("ML", "Mali", "fr"),
    ("MM", "Myanmar", "my"),
    ("MN", "Mongolia", "mn"),
    ("MO", "Macao", "zh"),
    ("MP", "Northern Mariana Islands", "en"),
    ("MQ", "Martinique", "fr"),
    ("MR", "Mauritania", "ar"),
    ("MS", "Montserrat", "en"),
    ("MT", "Malta", "mt"),
    ("MU", "Mauritius", "en"),
    ("MV", "Maldives", "dv"),
    ("MW", "Malawi", "en"),
    ("MX", "Mexico", "es"),
    ("MY", "Malaysia", "ms"),
    ("MZ", "Mozambique", "pt"),
    ("NA", "Namibia", "en"),
    ("NC", "New Caledonia", "fr"),
    ("NE", "Niger", "fr"),
    ("NF", "Norfolk Island", "en"),
    ("NG", "Nigeria", "en"),
    ("NI", "Nicaragua", "es"),
    ("NL", "Netherlands", "nl"),
    ("NO", "Norway", "no"),
    ("NP", "Nepal", "ne"),
    ("NR", "Nauru", "en"),
    ("NU", "Niue", "en"),
    ("NZ", "New Zealand", "en"),
    ("OM", "Oman", "ar"),
    ("PA", "Panama", "es"),
    ("PE", "Peru", "es"),
    ("PF", "French Polynesia", "fr"),
    ("PG", "Papua New Guinea", "en"),
    ("PH", "Philippines", "tl"),
    ("PK", "Pakistan", "ur"),
    ("PL", "Poland", "pl"),
    ("PM", "Saint Pierre and Miquelon", "fr"),
    ("PN", "Pitcairn Islands", "en"),
    ("PR", "Puerto Rico", "es"),
    ("PS", "Palestine", "ar"),
    ("PT", "Portugal", "pt"),
    ("PW", "Palau", "en"),
    ("PY", "Paraguay", "es"),
    ("QA", "Qatar", "ar"),
    ("RE", "Réunion", "fr"),
    ("RO", "Romania", "ro"),
    ("RS", "Serbia", "sr"),
    ("RU", "Russia", "ru"),
    ("RW", "Rwanda", "rw"),
    ("SA", "Saudi Arabia", "ar"),
    ("SB", "Solomon Islands", "en"),
    ("SC", "Seychelles", "en"),
    ("SD", "Sudan", "ar"),
    ("SE", "Sweden", "sv"),
    ("SG", "Singapore", "en"),
    ("SH", "Saint Helena", "en"),
    ("SI", "Slovenia", "sl"),
    ("SJ", "Svalbard and Jan Mayen", "no"),
    ("SK", "Slovakia", "sk"),
    ("SL", "Sierra Leone", "en"),
    ("SM", "San Marino", "it"),
    ("SN", "Senegal", "fr"),
    ("SO", "Somalia", "so"),
    ("SR", "Suriname", "nl"),
    ("SS", "South Sudan", "en"),
    ("ST", "São Tomé and Príncipe", "pt"),
    ("SV", "El Salvador", "es"),
    ("SX", "Sint Maarten", "nl"),
    ("SY", "Syria", "ar"),
    ("SZ", "Eswatini", "en"),
    ("TC", "Turks and Caicos Islands", "en"),
    ("TD", "Chad", "fr"),
    ("TF", "French Southern Territories", "fr"),
    ("TG", "Togo", "fr"),
    ("TH", "Thailand", "th"),
    ("TJ", "Tajikistan", "tg"),
    ("TK", "Tokelau", "en"),
    ("TL", "Timor-Leste", "pt"),
    ("TM", "Turkmenistan", "tk"),
    ("TN", "Tunisia", "ar"),
    ("TO", "Tonga", "to"),
    ("TR", "Türkiye", "tr"),
    ("TT", "Trinidad and Tobago", "en"),
    ("TV", "Tuvalu", "en"),
    ("TW", "Taiwan", "zh"),
    ("TZ", "Tanzania", "sw"),
    ("UA", "Ukraine", "uk"),
    ("UG", "Uganda", "en"),
    ("UM", "United States Minor Outlying Islands", "en"),
    ("US", "United States", "en"),
    ("UY", "Uruguay", "es"),
    ("UZ", "Uzbekistan", "uz"),
    ("VA", "Vatican City", "it"),
    ("VC", "Saint Vincent and the Grenadines", "en"),
    ("VE", "Venezuela", "es"),
    ("VG", "British Virgin Islands", "en"),
    ("VI", "U.S. Virgin Islands", "en"),
    ("VN", "Vietnam", "vi"),
    ("VU", "Vanuatu", "bi"),
    ("WF", "Wallis and Futuna", "fr"),
    ("WS", "Samoa", "sm"),
    ("XK", "Kosovo", "sq"),
    ("YE", "Yemen", "ar"),
    ("YT", "Mayotte", "fr"),
    ("ZA", "South Africa", "en"),
    ("ZM", "Zambia", "en"),
    ("ZW", "Zimbabwe", "en"),
];

/// `(language code, English name)`
const LANGUAGES: &[(&str, &str)] = &[
    ("am", "Amharic"),
    ("ar", "Arabic"),
    ("az", "Azerbaijani"),
    ("be", "Belarusian"),
    ("bg", "Bulgarian"),
    ("bi", "Bislama"),
    ("bn", "Bengali"),
    ("bs", "Bosnian"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("dv", "Dhivehi"),
    ("dz", "Dzongkha"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fo", "Faroese"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("hu", "Hungarian"),
    ("hy", "Armenian"),
    ("id", "Indonesian"),
    ("is", "Icelandic"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ka", "Georgian"),
    ("kk", "Kazakh"),
    ("kl", "Greenlandic"),
    ("km", "Khmer"),
    ("ko", "Korean"),
    ("ky", "Kyrgyz"),
    ("lb", "Luxembourgish"),
    ("lo", "Lao"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("mg", "Malagasy"),
    ("mk", "Macedonian"),
    ("mn", "Mongolian"),
    ("ms", "Malay"),
    ("mt", "Maltese"),
    ("my", "Burmese"),
    ("ne", "Nepali"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("ps", "Pashto"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("rw", "Kinyarwanda"),
    ("si", "Sinhala"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sm", "Samoan"),
    ("so", "Somali"),
    ("sq", "Albanian"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("sw", "Swahili"),
    ("tg", "Tajik"),
    ("th", "Thai"),
    ("ti", "Tigrinya"),
    ("tk", "Turkmen"),
    ("tl", "Tagalog"),
    ("to", "Tongan"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("uz", "Uzbek"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

/// Names in one display language, both tables sorted by code.
struct Translations {
    unknown: &'static str,
    countries: &'static [(&'static str, &'static str)],
    languages: &'static [(&'static str, &'static str)],
}

const FRENCH: Translations = Translations {
    unknown: "Inconnu",
    countries: &[
        ("AR", "Argentine"),
        ("AT", "Autriche"),
        ("AU", "Australie"),
        ("BE", "Belgique"),
        ("BR", "Brésil"),
        ("CA", "Canada"),
        ("CH", "Suisse"),
        ("CL", "Chili"),
        ("CN", "Chine"),
        ("CO", "Colombie"),
        ("CZ", "Tchéquie"),
        ("DE", "Allemagne"),
        ("DK", "Danemark"),
        ("DZ", "Algérie"),
        ("EG", "Égypte"),
        ("ES", "Espagne"),
        ("FI", "Finlande"),
        ("FR", "France"),
        ("GB", "Royaume-Uni"),
        ("GR", "Grèce"),
        ("HU", "Hongrie"),
        ("ID", "Indonésie"),
        ("IE", "Irlande"),
        ("IL", "Israël"),
        ("IN", "Inde"),
        ("IT", "Italie"),
        ("JP", "Japon"),
        ("KR", "Corée du Sud"),
        ("LU", "Luxembourg"),
        ("MA", "Maroc"),
        ("MX", "Mexique"),
        ("NG", "Nigeria"),
        ("NL", "Pays-Bas"),
        ("NO", "Norvège"),
        ("NZ", "Nouvelle-Zélande"),
        ("PE", "Pérou"),
        ("PH", "Philippines"),
        ("PL", "Pologne"),
        ("PT", "Portugal"),
        ("RO", "Roumanie"),
        ("RU", "Russie"),
        ("SA", "Arabie saoudite"),
        ("SE", "Suède"),
        ("SG", "Singapour"),
        ("SN", "Sénégal"),
        ("TH", "Thaïlande"),
        ("TN", "Tunisie"),
        ("TR", "Turquie"),
        ("UA", "Ukraine"),
        ("US", "États-Unis"),
        ("VN", "Viêt Nam"),
        ("ZA", "Afrique du Sud"),
    ],
    languages: &[
        ("ar", "arabe"),
        ("cs", "tchèque"),
        ("da", "danois"),
        ("de", "allemand"),
        ("el", "grec"),
        ("en", "anglais"),
        ("es", "espagnol"),
        ("fi", "finnois"),
        ("fr", "français"),
        ("he", "hébreu"),
        ("hi", "hindi"),
        ("hu", "hongrois"),
        ("id", "indonésien"),
        ("it", "italien"),
        ("ja", "japonais"),
        ("ko", "coréen"),
        ("nl", "néerlandais"),
        ("no", "norvégien"),
        ("pl", "polonais"),
        ("pt", "portugais"),
        ("ro", "roumain"),
        ("ru", "russe"),
        ("sv", "suédois"),
        ("th", "thaï"),
        ("tr", "turc"),
        ("uk", "ukrainien"),
        ("vi", "vietnamien"),
        ("zh", "chinois"),
    ],
};

/// Lower-cased language part of a locale tag: `fr_CA` and `fr-ca` give `fr`.
pub fn locale_language(locale: &str) -> String {
    locale
        .trim()
        .split(|c| c == '_' || c == '-')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn translations(locale: &str) -> Option<&'static Translations> {
    match locale_language(locale).as_str() {
        "fr" => Some(&FRENCH),
        _ => None,
    }
}

fn find(table: &'static [(&'static str, &'static str)], code: &str) -> Option<&'static str> {
    table
        .binary_search_by_key(&code, |(c, _)| *c)
        .ok()
        .map(|idx| table[idx].1)
}

fn country_entry(code: &CountryCode) -> Option<&'static (&'static str, &'static str, &'static str)> {
    COUNTRIES
        .binary_search_by_key(&code.as_str(), |(c, _, _)| *c)
        .ok()
        .map(|idx| &COUNTRIES[idx])
}

/// English country name, or `"Unknown"` for unmapped codes.
pub fn country_name(code: &CountryCode) -> &'static str {
    country_entry(code).map(|(_, name, _)| *name).unwrap_or("Unknown")
}

/// Primary language for a country; empty string when none is known.
pub fn language_for(code: &CountryCode) -> String {
    country_entry(code)
        .map(|(_, _, lang)| (*lang).to_string())
        .unwrap_or_default()
}

/// English language name; empty string for unknown codes.
pub fn language_name(code: &str) -> &'static str {
    let code = code.trim().to_ascii_lowercase();
    LANGUAGES
        .binary_search_by_key(&code.as_str(), |(c, _)| *c)
        .map(|idx| LANGUAGES[idx].1)
        .unwrap_or("")
}

/// Country name for display in `locale`, English when untranslated.
pub fn localized_country_name(code: &CountryCode, locale: &str) -> &'static str {
    let Some(t) = translations(locale) else {
        return country_name(code);
    };
    if country_entry(code).is_none() {
        return t.unknown;
    }
    find(t.countries, code.as_str()).unwrap_or_else(|| country_name(code))
}

/// Language name for display in `locale`, English when untranslated.
pub fn localized_language_name(code: &str, locale: &str) -> &'static str {
    let code = code.trim().to_ascii_lowercase();
    translations(locale)
        .and_then(|t| find(t.languages, &code))
        .unwrap_or_else(|| language_name(&code))
}

/// Regional indicator pair for the code, empty for unknown codes.
pub fn flag_emoji(code: &CountryCode) -> String {
    if code.is_unknown() {
        return String::new();
    }
    code.as_str()
        .bytes()
        .filter_map(|b| char::from_u32(0x1F1E6 + u32::from(b - b'A')))
        .collect()
}
