use chrono::NaiveDate;

/// Erreurs du noyau d'analyse. Toutes sont remontées à l'appelant immédiat.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("fenêtre vide : {0}")]
    EmptyWindow(String),

    #[error("cible de capture {target} infaisable pour la position {position}")]
    InfeasibleRange { position: usize, target: f64 },

    #[error("seulement {produced} tickets valides produits sur {requested} demandés")]
    InsufficientCandidates { produced: usize, requested: usize },

    #[error("aucun tirage réel enregistré le {0}")]
    MissingActualDraw(NaiveDate),

    #[error("configuration invalide : {0}")]
    InvalidConfiguration(String),

    #[error("tirage invalide : {0}")]
    InvalidDraw(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Raccourci pour `Err(Error::InvalidConfiguration(..))`.
pub fn invalid_config<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::InvalidConfiguration(msg.into()))
}
