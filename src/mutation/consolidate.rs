//! Canonical form of a mutation list.
//!
//! Concatenating the lists of a parent edge and a child edge can leave
//! several edits on the same site, and many single-base records where one
//! run would do. [`consolidate`] collapses a list to one edit per site (using
//! [`replace_mutation`] to combine successive edits) and regroups the result
//! into runs of up to six.

use std::collections::BTreeMap;

use crate::coordinates::Coordinate;
use crate::mutation::bit_encoding::{GAP_CODE, MAX_RUN};
use crate::mutation::{EditKind, NucMut, NucMutType};

/// Edit on one site: kind and the code written
pub type SiteEdit = (EditKind, u8);

/// Combines an earlier edit on a site with a later one.
///
/// Returns [`None`] when they cancel (an insertion later deleted).
pub fn replace_mutation(old: SiteEdit, new: SiteEdit) -> Option<SiteEdit> {
    use EditKind::*;
    let (old_kind, _) = old;
    let (new_kind, new_code) = new;
    match (old_kind, new_kind) {
        (Substitution, Deletion) => Some((Deletion, GAP_CODE)),
        (Substitution, _) => Some((Substitution, new_code)),
        (Insertion, Deletion) => None,
        (Insertion, _) => Some((Insertion, new_code)),
        (Deletion, Insertion) => Some((Substitution, new_code)),
        (Deletion, Substitution) => Some((Insertion, new_code)),
        (Deletion, Deletion) => Some((Deletion, GAP_CODE)),
    }
}

/// One edit per site, in coordinate order
pub fn expand(muts: &[NucMut]) -> BTreeMap<Coordinate, SiteEdit> {
    let mut sites: BTreeMap<Coordinate, SiteEdit> = BTreeMap::new();
    for m in muts {
        let kind = m.mut_type().edit();
        for (coord, code) in m.sites() {
            let code = if kind == EditKind::Deletion {
                GAP_CODE
            } else {
                code
            };
            let combined = match sites.get(&coord) {
                Some(old) => replace_mutation(*old, (kind, code)),
                None => Some((kind, code)),
            };
            match combined {
                Some(edit) => {
                    sites.insert(coord, edit);
                }
                None => {
                    sites.remove(&coord);
                }
            }
        }
    }
    sites
}

/// Canonical list with the same effect as `muts`.
///
/// Consecutive sites with the same edit kind are grouped into runs of at
/// most six; an isolated site becomes a single-base mutation.
pub fn consolidate(muts: &[NucMut]) -> Vec<NucMut> {
    let sites: Vec<(Coordinate, SiteEdit)> = expand(muts).into_iter().collect();
    let mut consolidated = Vec::with_capacity(sites.len());
    let mut start = 0;
    while start < sites.len() {
        let (first, (kind, _)) = sites[start];
        let mut end = start + 1;
        while end < sites.len()
            && end - start < MAX_RUN
            && sites[end].1 .0 == kind
            && sites[end - 1].0.is_followed_by(&sites[end].0)
        {
            end += 1;
        }
        let codes: Vec<u8> = sites[start..end].iter().map(|(_, (_, c))| *c).collect();
        let mut_type = if codes.len() == 1 {
            NucMutType::snp(kind)
        } else {
            NucMutType::run(kind)
        };
        consolidated.push(NucMut::new(first, mut_type, &codes));
        start = end;
    }
    consolidated
}

/// Canonical mutation list making the per-site edits of `sites`
pub fn from_sites(sites: &BTreeMap<Coordinate, SiteEdit>) -> Vec<NucMut> {
    let singles: Vec<NucMut> = sites
        .iter()
        .map(|(coord, (kind, code))| match kind {
            EditKind::Substitution => NucMut::substitution(*coord, *code),
            EditKind::Insertion => NucMut::insertion(*coord, *code),
            EditKind::Deletion => NucMut::deletion(*coord),
        })
        .collect();
    consolidate(&singles)
}

/// Whether two lists make the same per-site edits
pub fn similar(a: &[NucMut], b: &[NucMut]) -> bool {
    expand(a) == expand(b)
}
