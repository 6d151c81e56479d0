use crate::config::PriceList;
use crate::services::nlu;

#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Answer(String),
    ShowMenu,
    ShowFaqCategories,
    ShowContact,
}

struct Rule {
    name: &'static str,
    matches: fn(&str) -> bool,
    respond: fn(&str, &PriceList) -> IntentOutcome,
}

/// Ordered, short-circuiting rule table. First match wins; anything that
/// falls through goes on to scheduling cues and FAQ matching.
const RULES: &[Rule] = &[
    Rule {
        name: "pricing",
        matches: is_pricing,
        respond: pricing_answer,
    },
    Rule {
        name: "services",
        matches: is_services,
        respond: services_answer,
    },
    Rule {
        name: "renewal",
        matches: is_renewal,
        respond: renewal_answer,
    },
    Rule {
        name: "smalltalk",
        matches: is_smalltalk,
        respond: smalltalk_answer,
    },
    Rule {
        name: "faq",
        matches: is_faq_browse,
        respond: faq_browse_answer,
    },
    Rule {
        name: "contact",
        matches: is_contact,
        respond: contact_answer,
    },
    Rule {
        name: "about",
        matches: is_about,
        respond: about_answer,
    },
    Rule {
        name: "menu",
        matches: is_menu_request,
        respond: menu_answer,
    },
];

fn menu_answer(_text: &str, _prices: &PriceList) -> IntentOutcome {
    IntentOutcome::ShowMenu
}

fn faq_browse_answer(_text: &str, _prices: &PriceList) -> IntentOutcome {
    IntentOutcome::ShowFaqCategories
}

fn contact_answer(_text: &str, _prices: &PriceList) -> IntentOutcome {
    IntentOutcome::ShowContact
}

pub fn classify(text: &str, prices: &PriceList) -> Option<IntentOutcome> {
    let rule = RULES.iter().find(|r| (r.matches)(text))?;
    tracing::debug!(intent = rule.name, "intent rule matched");
    Some((rule.respond)(text, prices))
}

fn has_any(text: &str, words: &[&str]) -> bool {
    let tokens = nlu::tokens(text);
    words.iter().any(|w| tokens.iter().any(|t| t == w))
}

fn is_pricing(text: &str) -> bool {
    has_any(
        text,
        &[
            "precio",
            "precios",
            "coste",
            "costo",
            "cuesta",
            "cuestan",
            "tarifa",
            "tarifas",
            "presupuesto",
            "valor",
        ],
    ) || (has_any(text, &["vale"]) && has_any(text, &["cuanto", "cuanta"]))
}

fn pricing_answer(text: &str, prices: &PriceList) -> IntentOutcome {
    let norm = nlu::normalize(text);

    let body = if norm.contains("natural") {
        format!(
            "El certificado de firma electrónica para persona natural cuesta {}.",
            prices.persona_natural
        )
    } else if norm.contains("juridic") {
        format!(
            "El certificado para persona jurídica cuesta {}.",
            prices.persona_juridica
        )
    } else if norm.contains("renovacion") || norm.contains("renovar") {
        format!("La renovación de certificado cuesta {}.", prices.renovacion)
    } else if norm.contains("token") {
        format!("El token criptográfico cuesta {}.", prices.token)
    } else if norm.contains("empresarial") || norm.contains("empresa") {
        format!("El plan empresarial: {}.", prices.empresarial)
    } else {
        price_summary(prices)
    };

    IntentOutcome::Answer(body)
}

pub fn price_summary(prices: &PriceList) -> String {
    format!(
        "Nuestras tarifas:\n\
         • Persona natural: {}\n\
         • Persona jurídica: {}\n\
         • Renovación: {}\n\
         • Token criptográfico: {}\n\
         • Plan empresarial: {}",
        prices.persona_natural,
        prices.persona_juridica,
        prices.renovacion,
        prices.token,
        prices.empresarial
    )
}

fn is_services(text: &str) -> bool {
    let norm = nlu::normalize(text);
    has_any(text, &["servicio", "servicios"])
        || norm.contains("que hacen")
        || norm.contains("que ofrecen")
        || norm.contains("a que se dedican")
}

fn services_answer(_text: &str, _prices: &PriceList) -> IntentOutcome {
    IntentOutcome::Answer(
        "Ofrecemos emisión y renovación de certificados de firma electrónica para \
         personas naturales y jurídicas, tokens criptográficos y soporte técnico \
         para la instalación y el uso de la firma. Escriba \"agendar\" si desea \
         una demostración."
            .to_string(),
    )
}

fn is_renewal(text: &str) -> bool {
    has_any(
        text,
        &[
            "renovar",
            "renovacion",
            "renuevo",
            "renueva",
            "vencido",
            "vencida",
            "vencimiento",
        ],
    )
}

fn renewal_answer(_text: &str, prices: &PriceList) -> IntentOutcome {
    IntentOutcome::Answer(format!(
        "Para renovar su certificado solo necesita su documento de identidad \
         vigente y realizar el pago de la renovación ({}). El trámite se \
         completa el mismo día y no requiere cita si su certificado venció \
         hace menos de 30 días.",
        prices.renovacion
    ))
}

fn is_smalltalk(text: &str) -> bool {
    has_any(
        text,
        &[
            "hola",
            "buenas",
            "buenos",
            "saludos",
            "gracias",
            "adios",
            "chao",
            "listo",
            "perfecto",
            "ok",
        ],
    )
}

fn smalltalk_answer(text: &str, _prices: &PriceList) -> IntentOutcome {
    let body = if has_any(text, &["gracias"]) {
        "¡Con gusto! Si necesita algo más, aquí estoy."
    } else if has_any(text, &["adios", "chao"]) {
        "¡Hasta pronto! Que tenga un buen día."
    } else if has_any(text, &["hola", "buenas", "buenos", "saludos"]) {
        "¡Hola! 👋 Soy el asistente virtual. Puedo responder sus preguntas o \
         agendar una demostración. Escriba \"menú\" para ver las opciones."
    } else {
        "Perfecto. ¿Le puedo ayudar con algo más?"
    };
    IntentOutcome::Answer(body.to_string())
}

fn is_faq_browse(text: &str) -> bool {
    has_any(text, &["pregunta", "preguntas", "faq", "duda", "dudas"])
}

fn is_contact(text: &str) -> bool {
    has_any(text, &["contacto", "contactar", "telefono", "ayuda"])
}

fn is_about(text: &str) -> bool {
    has_any(text, &["acerca", "quienes", "ustedes"])
}

fn about_answer(_text: &str, _prices: &PriceList) -> IntentOutcome {
    IntentOutcome::Answer(
        "Somos un proveedor acreditado de servicios de certificación \
         electrónica. Emitimos y renovamos certificados de firma electrónica \
         para personas naturales y jurídicas, con oficinas en Caracas y \
         atención en todo el país. Escriba \"menú\" para ver lo que puedo \
         hacer por usted."
            .to_string(),
    )
}

fn is_menu_request(text: &str) -> bool {
    has_any(text, &["menu", "inicio", "opciones", "empezar"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> PriceList {
        PriceList {
            persona_natural: "25 USD".to_string(),
            persona_juridica: "35 USD".to_string(),
            renovacion: "20 USD".to_string(),
            token: "45 USD".to_string(),
            empresarial: "consultar".to_string(),
        }
    }

    fn answer(text: &str) -> String {
        match classify(text, &prices()) {
            Some(IntentOutcome::Answer(body)) => body,
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[test]
    fn test_pricing_summary() {
        let body = answer("¿cuánto cuesta?");
        assert!(body.contains("25 USD"));
        assert!(body.contains("35 USD"));
        assert!(body.contains("45 USD"));
    }

    #[test]
    fn test_pricing_product_submatch() {
        assert!(answer("precio para persona natural").contains("25 USD"));
        assert!(answer("¿cuánto cuesta para una persona jurídica?").contains("35 USD"));
        assert!(answer("costo del token").contains("45 USD"));
        assert!(answer("tarifa de renovación").contains("20 USD"));
    }

    #[test]
    fn test_cuanto_vale_is_pricing() {
        assert!(answer("¿cuánto vale?").contains("25 USD"));
    }

    #[test]
    fn test_pricing_beats_smalltalk() {
        // "hola" alone would be small talk; pricing is checked first
        let body = answer("hola, ¿qué precio tiene?");
        assert!(body.contains("25 USD"));
    }

    #[test]
    fn test_services() {
        assert!(answer("¿qué servicios ofrecen?").contains("certificados"));
        assert!(answer("¿a qué se dedican?").contains("firma"));
    }

    #[test]
    fn test_renewal() {
        assert!(answer("mi certificado está vencido").contains("renovar"));
        assert!(answer("quiero renovar").contains("20 USD"));
    }

    #[test]
    fn test_smalltalk_variants() {
        assert!(answer("hola").contains("asistente"));
        assert!(answer("muchas gracias").contains("gusto"));
        assert!(answer("adiós").contains("pronto"));
        assert!(answer("listo").contains("algo más"));
    }

    #[test]
    fn test_contact_keywords() {
        assert_eq!(classify("contacto", &prices()), Some(IntentOutcome::ShowContact));
        assert_eq!(
            classify("necesito ayuda", &prices()),
            Some(IntentOutcome::ShowContact)
        );
    }

    #[test]
    fn test_faq_keywords() {
        assert_eq!(
            classify("tengo una pregunta frecuente", &prices()),
            Some(IntentOutcome::ShowFaqCategories)
        );
        assert_eq!(
            classify("tengo dudas", &prices()),
            Some(IntentOutcome::ShowFaqCategories)
        );
    }

    #[test]
    fn test_about_keywords() {
        let body = answer("¿quiénes son ustedes?");
        assert!(body.contains("certificación"));
        assert!(answer("acerca de la empresa").contains("certificación"));
    }

    #[test]
    fn test_menu_keywords() {
        assert_eq!(classify("menú", &prices()), Some(IntentOutcome::ShowMenu));
        assert_eq!(
            classify("ver opciones", &prices()),
            Some(IntentOutcome::ShowMenu)
        );
    }

    #[test]
    fn test_no_rule_matches() {
        assert_eq!(classify("¿cómo firmo un pdf?", &prices()), None);
    }
}
