use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Un tirage historique, tel que stocké en base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub game: String,
    pub period: String,
    /// Date ISO (AAAA-MM-JJ).
    pub date: String,
    /// Zone principale, ou chiffres par position pour les jeux numériques.
    pub numbers: Vec<u8>,
    /// Deuxième zone (威力彩) ou numéro spécial (大樂透).
    #[serde(default)]
    pub secondary: Option<u8>,
}

impl DrawRecord {
    /// Clé de récence : plus grande = plus récent.
    pub fn recency_key(&self) -> (&str, &str) {
        (self.date.as_str(), self.period.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// k numéros distincts parmi une plage, ordre sans importance.
    Combination,
    /// Un chiffre par position, répétitions autorisées, ordre significatif.
    Digit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameShape {
    pub id: String,
    pub kind: ShapeKind,
    pub min: u8,
    pub max: u8,
    pub count: usize,
    #[serde(default)]
    pub secondary_max: Option<u8>,
    #[serde(default)]
    pub has_special: bool,
}

impl GameShape {
    pub fn lotto649() -> Self {
        Self {
            id: "lotto649".to_string(),
            kind: ShapeKind::Combination,
            min: 1,
            max: 49,
            count: 6,
            secondary_max: None,
            has_special: true,
        }
    }

    pub fn power638() -> Self {
        Self {
            id: "power638".to_string(),
            kind: ShapeKind::Combination,
            min: 1,
            max: 38,
            count: 6,
            secondary_max: Some(8),
            has_special: false,
        }
    }

    pub fn daily539() -> Self {
        Self {
            id: "daily539".to_string(),
            kind: ShapeKind::Combination,
            min: 1,
            max: 39,
            count: 5,
            secondary_max: None,
            has_special: false,
        }
    }

    pub fn digit3() -> Self {
        Self {
            id: "digit3".to_string(),
            kind: ShapeKind::Digit,
            min: 0,
            max: 9,
            count: 3,
            secondary_max: None,
            has_special: false,
        }
    }

    pub fn digit4() -> Self {
        Self {
            id: "digit4".to_string(),
            kind: ShapeKind::Digit,
            count: 4,
            ..Self::digit3()
        }
    }

    pub fn catalogue() -> Vec<GameShape> {
        vec![
            Self::lotto649(),
            Self::power638(),
            Self::daily539(),
            Self::digit3(),
            Self::digit4(),
        ]
    }

    pub fn by_id(id: &str) -> Option<GameShape> {
        Self::catalogue().into_iter().find(|s| s.id == id)
    }

    pub fn is_digit(&self) -> bool {
        self.kind == ShapeKind::Digit
    }

    /// Nombre de candidats distincts dans la zone principale.
    pub fn range_size(&self) -> usize {
        (self.max as usize).saturating_sub(self.min as usize) + 1
    }

    pub fn contains(&self, n: u8) -> bool {
        n >= self.min && n <= self.max
    }

    /// Tranches à scorer pour ce jeu.
    pub fn slices(&self) -> Vec<Slice> {
        match self.kind {
            ShapeKind::Digit => (0..self.count).map(Slice::Digit).collect(),
            ShapeKind::Combination => {
                let mut slices = vec![Slice::Main];
                if self.secondary_max.is_some() {
                    slices.push(Slice::Secondary);
                }
                slices
            }
        }
    }

    /// Bornes (min, max) d'une tranche.
    pub fn slice_bounds(&self, slice: Slice) -> Option<(u8, u8)> {
        match slice {
            Slice::Main => Some((self.min, self.max)),
            Slice::Secondary => self.secondary_max.map(|m| (1, m)),
            Slice::Digit(pos) if pos < self.count && self.is_digit() => Some((self.min, self.max)),
            Slice::Digit(_) => None,
        }
    }
}

/// Sous-ensemble d'un tirage soumis au scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slice {
    Main,
    Secondary,
    Digit(usize),
}

impl Slice {
    pub fn numbers_from<'a>(&self, draw: &'a DrawRecord, shape: &GameShape) -> &'a [u8] {
        match self {
            Slice::Main => {
                let end = shape.count.min(draw.numbers.len());
                &draw.numbers[..end]
            }
            Slice::Secondary => match &draw.secondary {
                Some(s) => std::slice::from_ref(s),
                None => &[],
            },
            Slice::Digit(pos) => match draw.numbers.get(*pos) {
                Some(d) => std::slice::from_ref(d),
                None => &[],
            },
        }
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slice::Main => write!(f, "zone principale"),
            Slice::Secondary => write!(f, "deuxième zone"),
            Slice::Digit(pos) => write!(f, "position {}", pos + 1),
        }
    }
}

pub fn validate_draw(shape: &GameShape, draw: &DrawRecord) -> Result<()> {
    if draw.numbers.len() != shape.count {
        bail!(
            "Tirage {} : {} numéros attendus, {} reçus",
            draw.period,
            shape.count,
            draw.numbers.len()
        );
    }
    for &n in &draw.numbers {
        if !shape.contains(n) {
            bail!("Numéro {} hors limites ({}-{})", n, shape.min, shape.max);
        }
    }
    if !shape.is_digit() {
        for i in 0..draw.numbers.len() {
            for j in (i + 1)..draw.numbers.len() {
                if draw.numbers[i] == draw.numbers[j] {
                    bail!("Numéro en double : {}", draw.numbers[i]);
                }
            }
        }
    }
    match (shape.secondary_max, draw.secondary) {
        (Some(max), Some(s)) if s < 1 || s > max => {
            bail!("Deuxième zone {} hors limites (1-{})", s, max);
        }
        (Some(_), None) => bail!("Tirage {} : deuxième zone manquante", draw.period),
        (None, Some(s)) if shape.has_special => {
            if !shape.contains(s) || draw.numbers.contains(&s) {
                bail!("Numéro spécial invalide : {}", s);
            }
        }
        (None, Some(_)) => bail!("Tirage {} : ce jeu n'a pas de deuxième zone", draw.period),
        _ => {}
    }
    Ok(())
}
