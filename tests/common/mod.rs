//! Shared fixtures and helpers for the integration suites.
#![allow(dead_code)]

use spa_engine::Analyzer;

/// The worked example program: three procedures, nested containers, a
/// loop, and a call chain `Example -> p -> q` / `Example -> q`.
///
/// Statement numbers:
/// ```text
/// Example: 1 x=2; 2 z=3; 3 i=5; 4 while; 5 x=x-1; 6 if; 7 z=x+1;
///          8 y=z+x; 9 z=z+x+i; 10 call q; 11 i=i-1; 12 call p;
/// p:       13 if; 14 while; 15 x=z*3+2*y; 16 call q; 17 i=i-1;
///          18 x=x+1; 19 z=x+z; 20 z=1; 21 z=z+x+i;
/// q:       22 if; 23 z=x+1; 24 x=z+x;
/// ```
pub const EXAMPLE: &str = "\
procedure Example {
  x = 2;
  z = 3;
  i = 5;
  while (i != 0) {
    x = x - 1;
    if (x == 1) then {
      z = x + 1; }
    else {
      y = z + x; }
    z = z + x + i;
    call q;
    i = i - 1; }
  call p; }
procedure p {
  if (x < 0) then {
    while (i > 0) {
      x = z * 3 + 2 * y;
      call q;
      i = i - 1; }
    x = x + 1;
    z = x + z; }
  else { z = 1; }
  z = z + x + i; }
procedure q {
  if (x == 1) then {
    z = x + 1; }
  else {
    x = z + x; } }
";

/// A second fixture with reads and prints, for attribute queries.
///
/// Statement numbers:
/// ```text
/// main:            1 flag=0; 2 call computeCentroid; 3 call printResults;
/// readPoint:       4 read x; 5 read y;
/// printResults:    6 print flag; 7 print cenX; 8 print cenY; 9 print normSq;
/// computeCentroid: 10 count=0; 11 cenX=0; 12 cenY=0; 13 call readPoint;
///                  14 while; 15 count=count+1; 16 cenX=cenX+x;
///                  17 cenY=cenY+y; 18 call readPoint;
///                  19 if; 20 flag=1; 21 cenX=cenX/count;
///                  22 cenY=cenY/count; 23 normSq=cenX*cenX+cenY*cenY;
/// ```
pub const CENTROID: &str = "\
procedure main {
  flag = 0;
  call computeCentroid;
  call printResults; }
procedure readPoint {
  read x;
  read y; }
procedure printResults {
  print flag;
  print cenX;
  print cenY;
  print normSq; }
procedure computeCentroid {
  count = 0;
  cenX = 0;
  cenY = 0;
  call readPoint;
  while ((x != 0) && (y != 0)) {
    count = count + 1;
    cenX = cenX + x;
    cenY = cenY + y;
    call readPoint; }
  if (count == 0) then {
    flag = 1; }
  else {
    cenX = cenX / count;
    cenY = cenY / count; }
  normSq = cenX * cenX + cenY * cenY; }
";

pub fn example() -> Analyzer {
    Analyzer::from_source(EXAMPLE).expect("the example fixture must analyze cleanly")
}

pub fn centroid() -> Analyzer {
    Analyzer::from_source(CENTROID).expect("the centroid fixture must analyze cleanly")
}

/// Evaluates a query and returns the results sorted lexicographically.
pub fn eval(analyzer: &Analyzer, query: &str) -> Vec<String> {
    let mut out = Vec::new();
    analyzer.evaluate(query, &mut out);
    out.sort();
    out
}

/// Evaluates a query whose results are statement numbers, sorted
/// numerically.
pub fn eval_nums(analyzer: &Analyzer, query: &str) -> Vec<usize> {
    let mut out = Vec::new();
    analyzer.evaluate(query, &mut out);
    let mut nums: Vec<usize> = out
        .iter()
        .map(|text| text.parse().expect("expected numeric results"))
        .collect();
    nums.sort_unstable();
    nums
}

/// Convenience for set-style assertions on name results.
pub fn eval_set(analyzer: &Analyzer, query: &str) -> std::collections::BTreeSet<String> {
    let mut out = Vec::new();
    analyzer.evaluate(query, &mut out);
    out.into_iter().collect()
}
