use crate::models::{Analysis, StructuredAnalysis};
use crate::traits::ChatModel;
use crate::ModelError;
use serde_json::Value;

pub const SYSTEM_PROMPT: &str = "Olet ESG‐tarkastusten asiantuntija.";

pub const MAX_COMPLETION_TOKENS: u32 = 4096;

const PROMPT_TEMPLATE: &str = r#"
<instructions>
    Olet ESG‐tarkastuksen asiantuntija. Vertaa seuraavaa otetta yrityksen ESG‐raportista
    annettuun sääntelytekstiin. Molemmat katkelmat kuuluvat samaan pykälään {section}.
    Tunnista:
      1. Epäselvyydet siinä, miten raportti käsittelee sääntelyä.
      2. Kaikki kohdat, jotka ovat ristiriidassa sääntelyn kanssa tai puuttuvat verrattuna sääntelytekstiin.
      3. Suositukset siitä, miten raportti voidaan yhdenmukaistaa sääntelyn kanssa.

    <strong>
        Lisäksi jokaiseen “ambiguity”‐ ja “inconsistency”‐kohtaan lisätään lähdeviite
        muodossa [Lähde: {section}] heti sen perään AINOASTAAN JOS kyseisessä kohdassa ollaan käytetty kyseistä lähdettä.
    </strong>
</instructions>

<report>
    {report_text}
</report>

<regulation>
    {regulation_text}
</regulation>

<strict>
    <response‐format>
        {
            "ambiguities": [
                /* Jokainen merkkijono päättyy lähdeviitteellä: "... [Lähde: {section}]" */
            ],
            "inconsistencies": [
                /* Sama: "... [Lähde: {section}]" */
            ],
            "recommendations": [ ... list of strings ... ]
        }
    </response‐format>
</strict>
"#;

/// Fills the instruction template. Placeholders are substituted in a single
/// pass so braces inside the excerpts are never re-expanded.
pub fn build_prompt(report_text: &str, regulation_text: &str, section: &str) -> String {
    let mut prompt = String::with_capacity(
        PROMPT_TEMPLATE.len() + report_text.len() + regulation_text.len(),
    );
    let mut rest = PROMPT_TEMPLATE;

    while let Some(start) = rest.find('{') {
        prompt.push_str(&rest[..start]);
        let tail = &rest[start..];
        let replacement = [
            ("{section}", section),
            ("{report_text}", report_text),
            ("{regulation_text}", regulation_text),
        ]
        .into_iter()
        .find(|(placeholder, _)| tail.starts_with(placeholder));

        match replacement {
            Some((placeholder, value)) => {
                prompt.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
    }
    prompt.push_str(rest);
    prompt
}

/// Sends one comparison request and returns the raw model text.
pub async fn compare<C>(
    chat: &C,
    report_text: &str,
    regulation_text: &str,
    section: &str,
) -> Result<String, ModelError>
where
    C: ChatModel + ?Sized,
{
    let prompt = build_prompt(report_text, regulation_text, section);
    chat.complete(SYSTEM_PROMPT, &prompt, MAX_COMPLETION_TOKENS)
        .await
}

/// Interprets model output. Any JSON object is accepted as structured, with
/// absent or non-list keys left empty; everything else is kept verbatim.
pub fn parse_analysis(raw: &str) -> Analysis {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => {
            let list = |key: &str| object.get(key).and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<String>>()
            });

            Analysis::Structured(StructuredAnalysis {
                ambiguities: list("ambiguities"),
                inconsistencies: list("inconsistencies"),
                recommendations: list("recommendations"),
            })
        }
        _ => Analysis::Unparsed {
            raw_output: raw.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn prompt_embeds_all_inputs() {
        let prompt = build_prompt("raportti {x}", "sääntely", "EBA/GL/2025/01");

        assert!(prompt.contains("raportti {x}"));
        assert!(prompt.contains("<regulation>\n    sääntely\n</regulation>"));
        assert!(prompt.contains("samaan pykälään EBA/GL/2025/01."));
        assert!(prompt.contains("[Lähde: EBA/GL/2025/01]"));
        assert!(prompt.contains("\"recommendations\": [ ... list of strings ... ]"));
        assert!(!prompt.contains("{section}"));
    }

    #[test]
    fn full_object_is_structured() {
        let analysis = parse_analysis(
            r#"{"ambiguities": ["a [Lähde: X]"], "inconsistencies": [], "recommendations": ["r1", "r2"]}"#,
        );
        assert_eq!(
            analysis,
            Analysis::Structured(StructuredAnalysis {
                ambiguities: Some(vec!["a [Lähde: X]".to_string()]),
                inconsistencies: Some(Vec::new()),
                recommendations: Some(vec!["r1".to_string(), "r2".to_string()]),
            })
        );
    }

    #[test]
    fn missing_keys_are_accepted() {
        let analysis = parse_analysis(r#"{"recommendations": ["only this"], "extra": 1}"#);
        match analysis {
            Analysis::Structured(structured) => {
                assert_eq!(structured.ambiguities, None);
                assert_eq!(structured.inconsistencies, None);
                assert_eq!(structured.recommendations, Some(vec!["only this".to_string()]));
            }
            other => panic!("expected structured analysis, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_kept_raw() {
        let raw = "```json\n{\"ambiguities\": []}\n```";
        assert_eq!(
            parse_analysis(raw),
            Analysis::Unparsed {
                raw_output: raw.to_string()
            }
        );
        assert!(!parse_analysis("[1, 2]").is_parsed());
    }

    struct RecordingChat {
        seen: Mutex<Vec<(String, String, u32)>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn complete(
            &self,
            system: &str,
            user: &str,
            max_completion_tokens: u32,
        ) -> Result<String, ModelError> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string(), max_completion_tokens));
            Ok("not json".to_string())
        }
    }

    #[tokio::test]
    async fn compare_sends_bounded_request() {
        let chat = RecordingChat {
            seen: Mutex::new(Vec::new()),
        };
        let output = compare(&chat, "report", "regulation", "title").await.unwrap();

        assert_eq!(output, "not json");
        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen[0].0, SYSTEM_PROMPT);
        assert!(seen[0].1.contains("<report>\n    report\n</report>"));
        assert_eq!(seen[0].2, MAX_COMPLETION_TOKENS);
    }
}
