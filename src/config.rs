use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::warn;

pub const GEMINI_TEMPERATURE: f32 = 1.0;
pub const GEMINI_TOP_P: f32 = 0.95;
pub const GEMINI_TOP_K: i32 = 64;
pub const GEMINI_MAX_OUTPUT_TOKENS: i32 = 8192;
pub const GEMINI_RESPONSE_MIME_TYPE: &str = "text/plain";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8501";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub bind_addr: SocketAddr,
    pub upload_limit_bytes: usize,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_bind_addr(value: &str) -> SocketAddr {
    match value.trim().parse::<SocketAddr>() {
        Ok(addr) => addr,
        Err(err) => {
            warn!(
                "Invalid BIND_ADDR value '{}' ({}); falling back to {}.",
                value, err, DEFAULT_BIND_ADDR
            );
            DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8501)))
        }
    }
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .unwrap_or_default();
        if gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: gemini_api_key.trim().to_string(),
            gemini_model: env_string("GEMINI_MODEL", "gemini-1.5-pro"),
            gemini_base_url: normalize_base_url(env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com",
            )),
            bind_addr: parse_bind_addr(&env_string("BIND_ADDR", DEFAULT_BIND_ADDR)),
            upload_limit_bytes: env_usize("UPLOAD_LIMIT_MB", 200).saturating_mul(1024 * 1024),
        })
    }
}

pub fn analysis_prompt() -> &'static str {
    ATTRIBUTE_ANALYSIS_PROMPT
}

pub const ATTRIBUTE_ANALYSIS_PROMPT: &str = r#"You are an AI trained to analyze human attributes from images with high accuracy.
Carefully analyze the given image and return the following structured details:

You must provide results based solely on the visible image data. Avoid any assumptions beyond what is observable. Do not apologize or return empty results.

🧑‍🤝‍🧑 Demographic & Facial Analysis:
- Gender Expression: Male / Female / Non-binary
- Age Estimate: Approximate age in years
- Ethnicity: Based on visible features
- Facial Structure: Notable characteristics
- Skin Tone: Light, Medium, Dark, specific undertones
- Eye Shape: Almond, Round, Hooded, etc.

😀 Emotional & Facial Expression Analysis:
- Primary Mood: Happy, Sad, Neutral, Excited, etc.
- Facial Expression: Smiling, Frowning, Neutral, Raised Eyebrows
- Emotions Detected: Joyful, Focused, Angry, Surprised, Anxious
- Confidence Level: Accuracy of prediction in percentage

👕 Clothing & Fashion Details:
- Top Type, Bottom Type, Color of Clothing
- Style & Formality: Casual, Formal, Sportswear, Traditional
- Brand Logos: Detect if any visible
- Seasonal Clothing: Identify if suitable for warm, cold, or rainy weather

🕶️ Accessories & Appearance Enhancements:
- Glasses, Jewelry, Beard & Facial Hair, Makeup, Headwear

💇 Hair & Facial Features:
- Hair Length, Hair Type, Hair Color
- Facial Hair: Yes/No (Specify type)
- Eye Color: Blue, Green, Brown, Hazel, Gray

📍 Environmental & Background Context:
- Indoor or Outdoor Setting, Weather Condition, Lighting Condition
- Objects in Background, People in Background
"#;
