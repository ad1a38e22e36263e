//! Addresses, country codes and locale reference data

pub mod address;
pub mod country;
pub mod locale;

pub use address::{normalize, normalize_or_default, AddressError, AddressFamily, NormalizedAddress};
pub use country::CountryCode;
pub use locale::{
    country_name, flag_emoji, language_for, language_name, locale_language,
    localized_country_name, localized_language_name,
};
