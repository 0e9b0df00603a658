//! Stems, hairpin loops and interior loops of a dot-bracket structure.
//!
//! Positions are 0-based. A stem is a maximal run of stacked pairs `(i, j), (i+1, j-1), …`.
//! A hairpin closes a stem whose inner side is entirely unpaired. An interior loop joins
//! two stems where the inner stem is the only structure nested inside the outer one.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("unmatched '{symbol}' at position {pos}")]
    Unbalanced { symbol: char, pos: usize },
    #[error("unexpected symbol '{symbol}' at position {pos}")]
    BadSymbol { symbol: char, pos: usize },
}

/// Stacked base pairs, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stem {
    pub pairs: Vec<(usize, usize)>,
}

impl Stem {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn innermost(&self) -> (usize, usize) {
        self.pairs[self.pairs.len() - 1]
    }
}

/// Unpaired run closed by a single pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hairpin {
    /// First unpaired position.
    pub start: usize,
    /// Number of unpaired positions.
    pub length: usize,
}

/// The terminal loop lookup either finds a hairpin or says there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HairpinLoop {
    Found(Hairpin),
    NoLoop,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulgeGraph {
    partners: Vec<Option<usize>>,
    stems: Vec<Stem>,
    hairpins: Vec<Hairpin>,
    /// Unpaired lengths on the 5' and 3' side of each interior loop.
    interior_loops: Vec<(usize, usize)>,
}

impl BulgeGraph {
    pub fn from_dot_bracket(structure: &str) -> Result<Self, StructureError> {
        let partners = pair_table(structure)?;
        let stems = find_stems(&partners);

        let mut hairpins = Vec::new();
        let mut interior_loops = Vec::new();
        for stem in &stems {
            let (i, j) = stem.innermost();
            let inner = ((i + 1)..j).find(|&p| partners[p].is_some());
            match inner {
                None => hairpins.push(Hairpin {
                    start: i + 1,
                    length: j - i - 1,
                }),
                Some(p) => {
                    let q = ((i + 1)..j).rev().find(|&p| partners[p].is_some());
                    // a single nested pair spanning p..q makes this a two-way junction
                    if let Some(q) = q {
                        if partners[p] == Some(q) {
                            interior_loops.push((p - i - 1, j - q - 1));
                        }
                    }
                }
            }
        }
        hairpins.sort_by_key(|h| h.start);

        Ok(Self {
            partners,
            stems,
            hairpins,
            interior_loops,
        })
    }

    /// Graph of a structure with no pairs at all.
    pub fn unpaired(len: usize) -> Self {
        Self {
            partners: vec![None; len],
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    pub fn partner(&self, pos: usize) -> Option<usize> {
        self.partners.get(pos).copied().flatten()
    }

    /// Stems ordered by their 5' start.
    pub fn stems(&self) -> &[Stem] {
        &self.stems
    }

    pub fn hairpins(&self) -> &[Hairpin] {
        &self.hairpins
    }

    pub fn interior_loops(&self) -> &[(usize, usize)] {
        &self.interior_loops
    }

    /// Every pair of every stem, stems in 5' order and pairs outermost first.
    pub fn stem_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.stems.iter().flat_map(|s| s.pairs.iter().copied())
    }

    pub fn longest_stem(&self) -> usize {
        self.stems.iter().map(Stem::len).max().unwrap_or(0)
    }

    /// The 5'-most hairpin, which is the terminal loop of a simple hairpin fold.
    pub fn terminal_loop(&self) -> HairpinLoop {
        match self.hairpins.first() {
            Some(h) => HairpinLoop::Found(*h),
            None => HairpinLoop::NoLoop,
        }
    }
}

fn pair_table(structure: &str) -> Result<Vec<Option<usize>>, StructureError> {
    const OPEN: [char; 4] = ['(', '[', '{', '<'];
    const CLOSE: [char; 4] = [')', ']', '}', '>'];

    let symbols: Vec<char> = structure.chars().collect();
    let mut partners = vec![None; symbols.len()];
    let mut stacks: [Vec<usize>; 4] = Default::default();

    for (pos, &symbol) in symbols.iter().enumerate() {
        if let Some(kind) = OPEN.iter().position(|&c| c == symbol) {
            stacks[kind].push(pos);
        } else if let Some(kind) = CLOSE.iter().position(|&c| c == symbol) {
            let open = stacks[kind]
                .pop()
                .ok_or(StructureError::Unbalanced { symbol, pos })?;
            partners[open] = Some(pos);
            partners[pos] = Some(open);
        } else if symbol != '.' && symbol != ',' && symbol != ':' {
            return Err(StructureError::BadSymbol { symbol, pos });
        }
    }
    for (kind, stack) in stacks.iter().enumerate() {
        if let Some(&pos) = stack.last() {
            return Err(StructureError::Unbalanced {
                symbol: OPEN[kind],
                pos,
            });
        }
    }
    Ok(partners)
}

fn find_stems(partners: &[Option<usize>]) -> Vec<Stem> {
    let mut stems = Vec::new();
    let mut taken = vec![false; partners.len()];
    for i in 0..partners.len() {
        let Some(j) = partners[i] else { continue };
        if j < i || taken[i] {
            continue;
        }
        let mut pairs = vec![(i, j)];
        taken[i] = true;
        let (mut a, mut b) = (i, j);
        while a + 1 < b - 1 && partners[a + 1] == Some(b - 1) {
            a += 1;
            b -= 1;
            taken[a] = true;
            pairs.push((a, b));
        }
        stems.push(Stem { pairs });
    }
    stems
}
