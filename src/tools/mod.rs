//! Model-invokable data tools
//!
//! A registry of typed, describable capabilities over the beneficiary and
//! transfer record services. Every handler is read-only and converts any
//! downstream fault into a human-readable error string returned as the
//! tool's result; a failed tool call never aborts the conversation turn.

mod clients;

pub use clients::*;

use crate::config::ServicesConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

/// Descriptor of one invokable tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Dispatcher holding the service clients behind the tool registry
pub struct ToolDispatcher {
    beneficiaries: BeneficiaryClient,
    transfers: TransferClient,
}

impl ToolDispatcher {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            beneficiaries: BeneficiaryClient::new(config)?,
            transfers: TransferClient::new(config)?,
        })
    }

    /// All available tool definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "get_all_beneficiaries".to_string(),
                description: "Récupère la liste de tous les bénéficiaires de la banque"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            ToolDefinition {
                name: "get_beneficiary".to_string(),
                description: "Récupère les informations d'un bénéficiaire par son ID".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "integer",
                            "description": "Identifiant du bénéficiaire"
                        }
                    },
                    "required": ["id"]
                }),
            },
            ToolDefinition {
                name: "search_beneficiaries".to_string(),
                description: "Recherche des bénéficiaires par nom".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "nom": {
                            "type": "string",
                            "description": "Nom à rechercher"
                        }
                    },
                    "required": ["nom"]
                }),
            },
            ToolDefinition {
                name: "get_all_transfers".to_string(),
                description: "Récupère la liste de tous les virements".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            ToolDefinition {
                name: "get_transfer".to_string(),
                description: "Récupère les informations d'un virement par son ID".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "integer",
                            "description": "Identifiant du virement"
                        }
                    },
                    "required": ["id"]
                }),
            },
            ToolDefinition {
                name: "get_transfers_by_beneficiary".to_string(),
                description: "Récupère tous les virements pour un bénéficiaire donné, avec le total".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "integer",
                            "description": "Identifiant du bénéficiaire"
                        }
                    },
                    "required": ["id"]
                }),
            },
        ]
    }

    /// Run a tool by name. Infallible: every failure comes back as an
    /// in-band error string.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> String {
        info!("Tool called: {} with {}", name, arguments);

        match name {
            "get_all_beneficiaries" => self.handle_all_beneficiaries().await,
            "get_beneficiary" => match require_id(arguments) {
                Ok(id) => self.handle_get_beneficiary(id).await,
                Err(msg) => msg,
            },
            "search_beneficiaries" => match arguments.get("nom").and_then(|v| v.as_str()) {
                Some(nom) => self.handle_search_beneficiaries(nom).await,
                None => "Paramètre requis manquant: nom".to_string(),
            },
            "get_all_transfers" => self.handle_all_transfers().await,
            "get_transfer" => match require_id(arguments) {
                Ok(id) => self.handle_get_transfer(id).await,
                Err(msg) => msg,
            },
            "get_transfers_by_beneficiary" => match require_id(arguments) {
                Ok(id) => self.handle_transfers_by_beneficiary(id).await,
                Err(msg) => msg,
            },
            _ => format!("Outil inconnu: {}", name),
        }
    }

    async fn handle_all_beneficiaries(&self) -> String {
        match self.beneficiaries.list().await {
            Ok(beneficiaries) => {
                if beneficiaries.is_empty() {
                    return "Aucun bénéficiaire trouvé.".to_string();
                }

                let mut result = String::from("Liste des bénéficiaires:\n");
                for b in &beneficiaries {
                    result.push_str(&format!(
                        "- ID: {}, Nom: {} {}, RIB: {}, Type: {}\n",
                        b.id, b.nom, b.prenom, b.rib, b.kind
                    ));
                }
                result
            }
            Err(e) => {
                error!("get_all_beneficiaries failed: {}", e);
                format!("Erreur lors de la récupération des bénéficiaires: {}", e)
            }
        }
    }

    async fn handle_get_beneficiary(&self, id: i64) -> String {
        match self.beneficiaries.get(id).await {
            Ok(b) => format!(
                "Bénéficiaire trouvé:\nID: {}\nNom: {} {}\nRIB: {}\nType: {}\nActif: {}\nDate création: {}",
                b.id,
                b.nom,
                b.prenom,
                b.rib,
                b.kind,
                match b.actif {
                    Some(true) => "Oui",
                    Some(false) => "Non",
                    None => "Inconnu",
                },
                b.date_creation.as_deref().unwrap_or("inconnue")
            ),
            Err(e) => {
                error!("get_beneficiary({}) failed: {}", id, e);
                format!("Erreur: Bénéficiaire non trouvé (ID: {})", id)
            }
        }
    }

    async fn handle_search_beneficiaries(&self, nom: &str) -> String {
        match self.beneficiaries.search(nom).await {
            Ok(beneficiaries) => {
                if beneficiaries.is_empty() {
                    return format!("Aucun bénéficiaire trouvé avec le nom: {}", nom);
                }

                let mut result = String::from("Bénéficiaires trouvés:\n");
                for b in &beneficiaries {
                    result.push_str(&format!(
                        "- ID: {}, Nom: {} {}, RIB: {}\n",
                        b.id, b.nom, b.prenom, b.rib
                    ));
                }
                result
            }
            Err(e) => {
                error!("search_beneficiaries({}) failed: {}", nom, e);
                format!("Erreur lors de la recherche: {}", e)
            }
        }
    }

    async fn handle_all_transfers(&self) -> String {
        match self.transfers.list().await {
            Ok(transfers) => {
                if transfers.is_empty() {
                    return "Aucun virement trouvé.".to_string();
                }

                let mut result = String::from("Liste des virements:\n");
                for v in &transfers {
                    result.push_str(&format!(
                        "- ID: {}, Bénéficiaire: {}, Montant: {:.2}€, Type: {}, Statut: {}, Date: {}\n",
                        v.id,
                        v.beneficiaire_id,
                        v.montant,
                        v.kind,
                        v.statut.as_deref().unwrap_or("inconnu"),
                        v.date_virement.as_deref().unwrap_or("inconnue")
                    ));
                }
                result
            }
            Err(e) => {
                error!("get_all_transfers failed: {}", e);
                format!("Erreur lors de la récupération des virements: {}", e)
            }
        }
    }

    async fn handle_get_transfer(&self, id: i64) -> String {
        match self.transfers.get(id).await {
            Ok(v) => format!(
                "Virement trouvé:\nID: {}\nBénéficiaire ID: {}\nRIB Source: {}\nMontant: {:.2}€\nDescription: {}\nType: {}\nStatut: {}\nDate: {}",
                v.id,
                v.beneficiaire_id,
                v.rib_source.as_deref().unwrap_or("inconnu"),
                v.montant,
                v.description.as_deref().unwrap_or(""),
                v.kind,
                v.statut.as_deref().unwrap_or("inconnu"),
                v.date_virement.as_deref().unwrap_or("inconnue")
            ),
            Err(e) => {
                error!("get_transfer({}) failed: {}", id, e);
                format!("Erreur: Virement non trouvé (ID: {})", id)
            }
        }
    }

    async fn handle_transfers_by_beneficiary(&self, beneficiary_id: i64) -> String {
        match self.transfers.by_beneficiary(beneficiary_id).await {
            Ok(transfers) => {
                if transfers.is_empty() {
                    return format!(
                        "Aucun virement trouvé pour le bénéficiaire ID: {}",
                        beneficiary_id
                    );
                }

                let mut result =
                    format!("Virements pour le bénéficiaire {}:\n", beneficiary_id);

                // The total is computed here, not trusted from the service
                let mut total = 0.0;
                for v in &transfers {
                    result.push_str(&format!(
                        "- ID: {}, Montant: {:.2}€, Type: {}, Statut: {}, Date: {}\n",
                        v.id,
                        v.montant,
                        v.kind,
                        v.statut.as_deref().unwrap_or("inconnu"),
                        v.date_virement.as_deref().unwrap_or("inconnue")
                    ));
                    total += v.montant;
                }

                result.push_str(&format!("\nTotal: {:.2}€", total));
                result
            }
            Err(e) => {
                error!("get_transfers_by_beneficiary({}) failed: {}", beneficiary_id, e);
                format!("Erreur lors de la récupération: {}", e)
            }
        }
    }
}

fn require_id(arguments: &Value) -> std::result::Result<i64, String> {
    arguments
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| "Paramètre requis manquant: id".to_string())
}
