use std::env;

use chrono::{Duration, NaiveDateTime, Utc};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Business-day window, local hours. Slots run start..end.
    pub business_start_hour: u32,
    pub business_end_hour: u32,
    /// Offset of the business timezone from UTC, in minutes.
    pub utc_offset_minutes: i64,
    /// Display label only; all stored datetimes are business-local naive.
    pub timezone: String,
    pub prices: PriceList,
    pub contact: ContactCard,
    pub notify_url: String,
    pub transcriber_url: String,
}

#[derive(Clone, Debug)]
pub struct PriceList {
    pub persona_natural: String,
    pub persona_juridica: String,
    pub renovacion: String,
    pub token: String,
    pub empresarial: String,
}

#[derive(Clone, Debug)]
pub struct ContactCard {
    pub phone: String,
    pub email: String,
    pub address: String,
    pub website: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "citabot.db".to_string()),
            business_start_hour: env::var("BUSINESS_START_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            business_end_hour: env::var("BUSINESS_END_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(17),
            utc_offset_minutes: env::var("BUSINESS_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(-240),
            timezone: env::var("TIMEZONE").unwrap_or_else(|_| "America/Caracas".to_string()),
            prices: PriceList {
                persona_natural: env::var("PRICE_PERSONA_NATURAL")
                    .unwrap_or_else(|_| "25 USD".to_string()),
                persona_juridica: env::var("PRICE_PERSONA_JURIDICA")
                    .unwrap_or_else(|_| "35 USD".to_string()),
                renovacion: env::var("PRICE_RENOVACION").unwrap_or_else(|_| "20 USD".to_string()),
                token: env::var("PRICE_TOKEN").unwrap_or_else(|_| "45 USD".to_string()),
                empresarial: env::var("PRICE_EMPRESARIAL")
                    .unwrap_or_else(|_| "consultar con ventas".to_string()),
            },
            contact: ContactCard {
                phone: env::var("CONTACT_PHONE").unwrap_or_else(|_| "+58 212-555-0134".to_string()),
                email: env::var("CONTACT_EMAIL")
                    .unwrap_or_else(|_| "soporte@firmadigital.example".to_string()),
                address: env::var("CONTACT_ADDRESS")
                    .unwrap_or_else(|_| "Av. Francisco de Miranda, Caracas".to_string()),
                website: env::var("CONTACT_WEBSITE")
                    .unwrap_or_else(|_| "https://firmadigital.example".to_string()),
            },
            notify_url: env::var("NOTIFY_URL").unwrap_or_default(),
            transcriber_url: env::var("TRANSCRIBER_URL").unwrap_or_default(),
        }
    }

    /// Current time in the business timezone, as a naive local datetime.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc() + Duration::minutes(self.utc_offset_minutes)
    }

    pub fn business_hours_label(&self) -> String {
        format!(
            "{}:00 a {}:00 ({})",
            self.business_start_hour, self.business_end_hour, self.timezone
        )
    }
}
