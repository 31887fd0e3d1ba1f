//! Prompt templating over the OpenAI client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{ResponseDocument, Tender};
use crate::error::ApiError;
use crate::format::format_currency;
use crate::integrations::OpenAiClient;
use crate::services::document_service::{DocumentService, NewDocument};
use crate::services::tender_service::TenderService;
use crate::validation::{self, FieldErrors, Validate};

const SYSTEM_PROMPT: &str = "Tu es un consultant expert en réponse aux appels d'offres publics et privés en France. \
Tu rédiges des mémoires techniques clairs, structurés et convaincants, en français, \
sans inventer de chiffres ni de références qui ne te sont pas fournis.";

const MAX_COMPLETION_TOKENS: u32 = 1_500;
const IMAGE_SIZES: &[&str] = &["1024x1024", "1792x1024", "1024x1792"];

/// Known sections and what each one asks the model to write
const SECTIONS: &[(&str, &str, &str)] = &[
    (
        "executive_summary",
        "Synthèse",
        "Rédige une synthèse de notre offre qui montre notre compréhension du besoin et nos atouts.",
    ),
    (
        "technical_approach",
        "Approche technique",
        "Décris l'approche technique proposée pour répondre au besoin, étape par étape.",
    ),
    (
        "methodology",
        "Méthodologie",
        "Présente la méthodologie de conduite du projet : organisation, planning, suivi qualité.",
    ),
    (
        "team",
        "Équipe projet",
        "Présente l'organisation de l'équipe projet et le rôle de chaque profil.",
    ),
    (
        "risks",
        "Gestion des risques",
        "Identifie les principaux risques du projet et les mesures de maîtrise associées.",
    ),
];

#[derive(Debug, Deserialize)]
pub struct GenerateSectionRequest {
    pub tender_id: Uuid,
    pub section: String,
    pub instructions: Option<String>,
    #[serde(default)]
    pub save: bool,
}

impl Validate for GenerateSectionRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("section", validation::required(&self.section, 64));
        errors.check("instructions", validation::optional(self.instructions.as_deref(), 4_000));
        errors.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    pub prompt: String,
    pub size: Option<String>,
}

impl Validate for GenerateImageRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check("prompt", validation::required(&self.prompt, 4_000));
        if let Some(size) = &self.size {
            if !IMAGE_SIZES.contains(&size.as_str()) {
                errors.add("size", format!("Must be one of {}", IMAGE_SIZES.join(", ")));
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratedSection {
    pub section: String,
    pub title: String,
    pub content: String,
    pub document: Option<ResponseDocument>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedImage {
    pub url: String,
}

/// Title and task for a section; unknown sections get a generic task
fn section_template(section: &str) -> (String, String) {
    match SECTIONS.iter().find(|(key, _, _)| *key == section) {
        Some((_, title, task)) => (title.to_string(), task.to_string()),
        None => (
            section.replace('_', " "),
            format!("Rédige la section « {} » de notre réponse.", section.replace('_', " ")),
        ),
    }
}

/// Fill the prompt template with the tender's known fields
pub fn build_section_prompt(tender: &Tender, section: &str, instructions: Option<&str>) -> String {
    let (_, task) = section_template(section);
    let mut prompt = format!("{}\n\nAppel d'offres :\n- Intitulé : {}\n", task, tender.title);

    if let Some(reference) = &tender.reference {
        prompt.push_str(&format!("- Référence : {}\n", reference));
    }
    if let Some(buyer) = &tender.buyer_name {
        prompt.push_str(&format!("- Acheteur : {}\n", buyer));
    }
    if let Some(deadline) = tender.deadline {
        prompt.push_str(&format!("- Date limite : {}\n", deadline.format("%d/%m/%Y")));
    }
    if let Some(value) = tender.estimated_value {
        prompt.push_str(&format!("- Montant estimé : {}\n", format_currency(value, &tender.currency, "fr-FR")));
    }
    if let Some(description) = tender.description.as_deref().filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("\nDescription du besoin :\n{}\n", description.trim()));
    }
    if let Some(extra) = instructions.map(str::trim).filter(|i| !i.is_empty()) {
        prompt.push_str(&format!("\nConsignes supplémentaires :\n{}\n", extra));
    }
    prompt
}

pub struct AiService<'a> {
    openai: &'a OpenAiClient,
}

impl<'a> AiService<'a> {
    pub fn new(openai: &'a OpenAiClient) -> Self {
        Self { openai }
    }

    pub async fn generate_section(
        &self,
        tenders: &TenderService,
        documents: &DocumentService,
        company_id: Uuid,
        user_id: Uuid,
        request: GenerateSectionRequest,
    ) -> Result<GeneratedSection, ApiError> {
        let tender = tenders.get(company_id, request.tender_id).await?;
        let prompt = build_section_prompt(&tender, &request.section, request.instructions.as_deref());
        let content = self.openai.complete(SYSTEM_PROMPT, &prompt, MAX_COMPLETION_TOKENS).await?;
        let (title, _) = section_template(&request.section);

        let document = if request.save {
            let new_document = NewDocument {
                section: &request.section,
                title: &title,
                content: &content,
                generated_by_ai: true,
            };
            Some(documents.create(company_id, tender.id, user_id, new_document).await?)
        } else {
            None
        };

        tracing::info!(tender_id = %tender.id, section = %request.section, saved = document.is_some(), "Section generated");
        Ok(GeneratedSection { section: request.section, title, content, document })
    }

    pub async fn generate_image(&self, request: GenerateImageRequest) -> Result<GeneratedImage, ApiError> {
        let size = request.size.as_deref().unwrap_or(IMAGE_SIZES[0]);
        let url = self.openai.generate_image(request.prompt.trim(), size).await?;
        Ok(GeneratedImage { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TenderStatus;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn tender() -> Tender {
        let now = Utc::now();
        Tender {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            title: "Maintenance des espaces verts".to_string(),
            reference: Some("EV-2025-12".to_string()),
            buyer_name: Some("Ville de Nantes".to_string()),
            buyer_reference: None,
            description: Some("Entretien de 40 hectares.".to_string()),
            status: TenderStatus::Analysis,
            deadline: Some(Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()),
            estimated_value: Some(Decimal::new(15000000, 2)),
            currency: "EUR".to_string(),
            source_url: None,
            assigned_to: None,
            created_by: Uuid::new_v4(),
            submitted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn prompt_includes_tender_fields() {
        let prompt = build_section_prompt(&tender(), "methodology", Some("Insister sur la sécurité"));
        assert!(prompt.starts_with("Présente la méthodologie"));
        assert!(prompt.contains("Maintenance des espaces verts"));
        assert!(prompt.contains("EV-2025-12"));
        assert!(prompt.contains("Ville de Nantes"));
        assert!(prompt.contains("30/06/2025"));
        assert!(prompt.contains("150\u{202F}000,00\u{00A0}€"));
        assert!(prompt.contains("Insister sur la sécurité"));
    }

    #[test]
    fn unknown_sections_fall_back_to_generic_task() {
        let (title, task) = section_template("references_clients");
        assert_eq!(title, "references clients");
        assert!(task.contains("references clients"));
    }

    #[test]
    fn image_size_must_be_supported() {
        let request = GenerateImageRequest { prompt: "Chantier".to_string(), size: Some("10x10".to_string()) };
        assert!(request.validate().is_err());
        let request = GenerateImageRequest { prompt: "Chantier".to_string(), size: None };
        assert!(request.validate().is_ok());
    }
}
