//! Localized reason texts and recommendations.
//!
//! Every user-facing string is a `tera` template registered per locale, so
//! adding a language means adding one template table.

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::conflicts::model::{
    CaseId, ConflictLevel, EntityCategory, EntitySlot, MatchConfidence, PartyRole, ReasonCategory,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Tr,
}

impl Locale {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-gb" => Some(Self::En),
            "tr" | "tr-tr" => Some(Self::Tr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Tr => "tr",
        }
    }
}

const EN_TEMPLATES: &[(&str, &str)] = &[
    (
        "reason/direct_opposition",
        "Case #{{ case_id }}: {{ query_name }} ({{ query_role }} here) was the {{ matched_role }} there; the parties are directly opposed ({{ confidence }} match).",
    ),
    (
        "reason/position_switch",
        "Case #{{ case_id }}: the parties have switched sides; {{ query_name }} was the {{ matched_role }} there and is the {{ query_role }} here ({{ confidence }} match).",
    ),
    (
        "reason/lawyer_conflict",
        "Case #{{ case_id }}: {{ reviewers }} worked on that case, where {{ matched_name }} was the {{ matched_role }}; {{ query_name }} is now the {{ query_role }} ({{ confidence }} match).",
    ),
    (
        "reason/related_entity",
        "Case #{{ case_id }}: {{ query_name }} ({{ query_role }} here) appears there as {{ matched_role }} {{ matched_name }} ({{ confidence }} match).",
    ),
    (
        "reason/cross_entity",
        "Case #{{ case_id }}: affiliated entities overlap; {{ query_name }} ({{ query_role }} here) appears there as {{ matched_role }} {{ matched_name }} ({{ confidence }} match).",
    ),
    (
        "recommendation/none/0",
        "No conflict found; the case can proceed.",
    ),
    (
        "recommendation/low/0",
        "Possible indirect conflict; review the listed cases before proceeding.",
    ),
    (
        "recommendation/medium/0",
        "Potential conflict; a partner must review the listed cases before proceeding.",
    ),
    (
        "recommendation/medium/1",
        "Record the outcome of the review in the case file.",
    ),
    (
        "recommendation/high/0",
        "Direct conflict; do not proceed without approval.",
    ),
    (
        "recommendation/high/1",
        "Obtain written waivers from the affected clients or decline the case.",
    ),
    (
        "recommendation/ambiguous",
        "{{ count }} identities matched several cases by name only; confirm them manually.",
    ),
];

const TR_TEMPLATES: &[(&str, &str)] = &[
    (
        "reason/direct_opposition",
        "Dosya #{{ case_id }}: {{ query_name }} bu dosyada {{ query_role }}, o dosyada {{ matched_role }}; taraflar doğrudan karşı karşıya ({{ confidence }} eşleşmesi).",
    ),
    (
        "reason/position_switch",
        "Dosya #{{ case_id }}: taraflar yer değiştirmiş; {{ query_name }} o dosyada {{ matched_role }}, bu dosyada {{ query_role }} ({{ confidence }} eşleşmesi).",
    ),
    (
        "reason/lawyer_conflict",
        "Dosya #{{ case_id }}: {{ reviewers }} o dosyada görev aldı ve {{ matched_name }} orada {{ matched_role }} idi; {{ query_name }} şimdi {{ query_role }} ({{ confidence }} eşleşmesi).",
    ),
    (
        "reason/related_entity",
        "Dosya #{{ case_id }}: {{ query_name }} (bu dosyada {{ query_role }}) o dosyada {{ matched_role }} olarak yer alıyor: {{ matched_name }} ({{ confidence }} eşleşmesi).",
    ),
    (
        "reason/cross_entity",
        "Dosya #{{ case_id }}: bağlı kişi/kuruluş kesişmesi; {{ query_name }} (bu dosyada {{ query_role }}) o dosyada {{ matched_role }}: {{ matched_name }} ({{ confidence }} eşleşmesi).",
    ),
    (
        "recommendation/none/0",
        "Çakışma bulunamadı; dosya açılabilir.",
    ),
    (
        "recommendation/low/0",
        "Dolaylı çakışma ihtimali; devam etmeden önce listelenen dosyaları inceleyin.",
    ),
    (
        "recommendation/medium/0",
        "Olası çakışma; devam etmeden önce listelenen dosyalar bir ortak tarafından incelenmelidir.",
    ),
    (
        "recommendation/medium/1",
        "İnceleme sonucunu dosyaya kaydedin.",
    ),
    (
        "recommendation/high/0",
        "Doğrudan çakışma; onay alınmadan devam etmeyin.",
    ),
    (
        "recommendation/high/1",
        "İlgili müvekkillerden yazılı muvafakat alın veya dosyayı reddedin.",
    ),
    (
        "recommendation/ambiguous",
        "{{ count }} kimlik birden fazla dosyayla yalnızca isim üzerinden eşleşti; kimlikleri elle doğrulayın.",
    ),
];

fn templates(locale: Locale) -> &'static [(&'static str, &'static str)] {
    match locale {
        Locale::En => EN_TEMPLATES,
        Locale::Tr => TR_TEMPLATES,
    }
}

fn slot_label(locale: Locale, slot: EntitySlot) -> &'static str {
    match (locale, slot) {
        (Locale::En, EntitySlot::Party(PartyRole::Client)) => "client",
        (Locale::En, EntitySlot::Party(PartyRole::Opponent)) => "opponent",
        (Locale::En, EntitySlot::Affiliated(EntityCategory::RelatedCompany)) => "related company",
        (Locale::En, EntitySlot::Affiliated(EntityCategory::RelatedIndividual)) => {
            "related individual"
        }
        (Locale::En, EntitySlot::Affiliated(EntityCategory::Founder)) => "founder",
        (Locale::En, EntitySlot::Affiliated(EntityCategory::Director)) => "director",
        (Locale::En, EntitySlot::Affiliated(EntityCategory::Beneficiary)) => "beneficiary",
        (Locale::En, EntitySlot::Affiliated(EntityCategory::ContactPerson)) => "contact person",
        (Locale::Tr, EntitySlot::Party(PartyRole::Client)) => "müvekkil",
        (Locale::Tr, EntitySlot::Party(PartyRole::Opponent)) => "karşı taraf",
        (Locale::Tr, EntitySlot::Affiliated(EntityCategory::RelatedCompany)) => "ilişkili şirket",
        (Locale::Tr, EntitySlot::Affiliated(EntityCategory::RelatedIndividual)) => "ilişkili kişi",
        (Locale::Tr, EntitySlot::Affiliated(EntityCategory::Founder)) => "kurucu",
        (Locale::Tr, EntitySlot::Affiliated(EntityCategory::Director)) => "yönetici",
        (Locale::Tr, EntitySlot::Affiliated(EntityCategory::Beneficiary)) => "lehtar",
        (Locale::Tr, EntitySlot::Affiliated(EntityCategory::ContactPerson)) => "irtibat kişisi",
    }
}

fn confidence_label(locale: Locale, confidence: MatchConfidence) -> &'static str {
    match (locale, confidence) {
        (Locale::En, MatchConfidence::Identifier) => "identifier",
        (Locale::En, MatchConfidence::Name) => "name",
        (Locale::Tr, MatchConfidence::Identifier) => "kimlik numarası",
        (Locale::Tr, MatchConfidence::Name) => "isim",
    }
}

/// Values substituted into a reason template.
#[derive(Debug, Clone, Copy)]
pub struct ReasonText<'a> {
    pub category: ReasonCategory,
    pub case_id: CaseId,
    pub confidence: MatchConfidence,
    pub query_slot: EntitySlot,
    pub query_name: &'a str,
    pub matched_slot: EntitySlot,
    pub matched_name: &'a str,
    pub reviewer_ids: &'a [String],
}

/// Compiled templates for one locale.
#[derive(Debug)]
pub struct MessageCatalog {
    tera: Tera,
    locale: Locale,
}

impl MessageCatalog {
    pub fn new(locale: Locale) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates(locale).iter().copied())?;
        Ok(Self { tera, locale })
    }

    pub fn reason_text(&self, text: &ReasonText<'_>) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("case_id", &text.case_id);
        context.insert("confidence", confidence_label(self.locale, text.confidence));
        context.insert("query_name", text.query_name);
        context.insert("query_role", slot_label(self.locale, text.query_slot));
        context.insert("matched_name", text.matched_name);
        context.insert("matched_role", slot_label(self.locale, text.matched_slot));
        context.insert("reviewers", &text.reviewer_ids.join(", "));
        self.tera
            .render(&format!("reason/{}", text.category.as_str()), &context)
    }

    /// Recommendations for `level`, plus one line when ambiguous name matches exist.
    pub fn recommendations(
        &self,
        level: ConflictLevel,
        ambiguous_identities: usize,
    ) -> Result<Vec<String>, tera::Error> {
        let prefix = format!("recommendation/{}/", level.as_str());
        let context = Context::new();
        let mut out = Vec::new();
        for (name, _) in templates(self.locale) {
            if name.starts_with(&prefix) {
                out.push(self.tera.render(name, &context)?);
            }
        }

        if ambiguous_identities > 0 {
            let mut context = Context::new();
            context.insert("count", &ambiguous_identities);
            out.push(self.tera.render("recommendation/ambiguous", &context)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(category: ReasonCategory) -> ReasonText<'static> {
        ReasonText {
            category,
            case_id: 42,
            confidence: MatchConfidence::Identifier,
            query_slot: EntitySlot::Party(PartyRole::Opponent),
            query_name: "Alpha Corp",
            matched_slot: EntitySlot::Party(PartyRole::Client),
            matched_name: "Alpha Corp.",
            reviewer_ids: &[],
        }
    }

    #[test]
    fn every_reason_category_renders_in_every_locale() {
        for locale in [Locale::En, Locale::Tr] {
            let catalog = MessageCatalog::new(locale).expect("catalog");
            for category in [
                ReasonCategory::DirectOpposition,
                ReasonCategory::PositionSwitch,
                ReasonCategory::LawyerConflict,
                ReasonCategory::RelatedEntity,
                ReasonCategory::CrossEntity,
            ] {
                let rendered = catalog.reason_text(&text(category)).expect("render");
                assert!(rendered.contains("#42"), "missing case id: {rendered}");
                assert!(rendered.contains("Alpha Corp"), "missing name: {rendered}");
            }
        }
    }

    #[test]
    fn english_direct_opposition_text() {
        let catalog = MessageCatalog::new(Locale::En).expect("catalog");
        let rendered = catalog
            .reason_text(&text(ReasonCategory::DirectOpposition))
            .expect("render");
        assert_eq!(
            rendered,
            "Case #42: Alpha Corp (opponent here) was the client there; the parties are directly opposed (identifier match)."
        );
    }

    #[test]
    fn lawyer_text_lists_reviewers() {
        let catalog = MessageCatalog::new(Locale::En).expect("catalog");
        let reviewers = vec!["lawyer-a".to_string(), "lawyer-b".to_string()];
        let mut args = text(ReasonCategory::LawyerConflict);
        args.reviewer_ids = &reviewers;
        let rendered = catalog.reason_text(&args).expect("render");
        assert!(rendered.contains("lawyer-a, lawyer-b"), "got: {rendered}");
    }

    #[test]
    fn turkish_labels_are_used() {
        let catalog = MessageCatalog::new(Locale::Tr).expect("catalog");
        let rendered = catalog
            .reason_text(&text(ReasonCategory::DirectOpposition))
            .expect("render");
        assert!(rendered.contains("karşı taraf"), "got: {rendered}");
        assert!(rendered.contains("müvekkil"), "got: {rendered}");
    }

    #[test]
    fn recommendations_are_keyed_by_level() {
        let catalog = MessageCatalog::new(Locale::En).expect("catalog");
        assert_eq!(
            catalog.recommendations(ConflictLevel::None, 0).expect("none"),
            vec!["No conflict found; the case can proceed.".to_string()]
        );
        let high = catalog.recommendations(ConflictLevel::High, 0).expect("high");
        assert_eq!(high.len(), 2);
        assert!(high[0].contains("do not proceed without approval"));

        let low = catalog.recommendations(ConflictLevel::Low, 3).expect("low");
        assert_eq!(low.len(), 2);
        assert!(low[1].starts_with("3 identities"), "got: {}", low[1]);
    }

    #[test]
    fn locale_parse_accepts_regional_tags() {
        assert_eq!(Locale::parse("EN-us"), Some(Locale::En));
        assert_eq!(Locale::parse("tr"), Some(Locale::Tr));
        assert_eq!(Locale::parse("de"), None);
    }
}
