//! Text-to-speech (TTS) processing

use secrecy::ExposeSecret;

use crate::config::{TtsConfig, TtsProviderKind};
use crate::{Error, Result};

/// HTTP speech synthesis backend
#[derive(Clone, Copy, Debug)]
enum TtsBackend {
    OpenAI,
    ElevenLabs,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f32,
    model: String,
    backend: TtsBackend,
}

impl TextToSpeech {
    /// Build a synthesizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the provider is not an HTTP backend or the API key is
    /// missing
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let backend = match config.provider {
            TtsProviderKind::OpenAI => TtsBackend::OpenAI,
            TtsProviderKind::ElevenLabs => TtsBackend::ElevenLabs,
            TtsProviderKind::Console => {
                return Err(Error::Config(
                    "console output does not synthesize speech".to_string(),
                ));
            }
        };

        let api_key = config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .unwrap_or_default();
        if api_key.is_empty() {
            return Err(Error::Config(match backend {
                TtsBackend::OpenAI => "OpenAI API key required for TTS".to_string(),
                TtsBackend::ElevenLabs => "ElevenLabs API key required for TTS".to_string(),
            }));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: config.voice.clone(),
            speed: config.speed,
            model: config.model.clone(),
            backend,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.backend {
            TtsBackend::OpenAI => self.synthesize_openai(text).await,
            TtsBackend::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{}", self.voice);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_provider_rejected() {
        let config = TtsConfig {
            provider: TtsProviderKind::Console,
            ..TtsConfig::default()
        };
        assert!(matches!(
            TextToSpeech::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(TextToSpeech::from_config(&TtsConfig::default()).is_err());
    }
}
