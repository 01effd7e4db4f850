//
// Hashiwokakero solver
//
// Copyright 2021 Simon Frankau
//

use std::fs::File;
use std::io::{stdin, stdout, BufWriter, Read, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use log::{debug, info, trace, LevelFilter};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////
// Data structures / problem representation
//

// An island is a numbered cell. Islands are numbered in row-major
// discovery order, and that number is how everything else refers to
// them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Island {
    row: usize,
    col: usize,
    required: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Orientation {
    Horizontal,
    Vertical,
}

// Bridges only ever run east or south from the island that owns them.
const ALL_ORIENTATIONS: &[Orientation] = &[Orientation::Horizontal, Orientation::Vertical];

// A candidate edge joins an island to its nearest neighbour to the
// east or south. 'a' always comes before 'b' in discovery order, and
// 'index' is the position of the edge's variable in the search.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Edge {
    index: usize,
    a: usize,
    b: usize,
    orientation: Orientation,
}

// The parsed input: which grid cells hold which island, plus the
// islands themselves. Lines may be ragged; anything off the end of a
// line is water.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Layout {
    cells: Vec<Vec<Option<usize>>>,
    islands: Vec<Island>,
}

// Everything the search needs to know about a puzzle. Built fresh for
// every solve.
#[derive(Clone, Debug)]
struct Puzzle {
    islands: Vec<Island>,
    edges: Vec<Edge>,
    // Per island, indices of the edges touching it, ascending.
    incident: Vec<Vec<usize>>,
    // Per edge, indices of the edges it crosses.
    crossings: Vec<Vec<usize>>,
}

// A full assignment of bridge counts, indexed by edge.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Solution(Vec<usize>);

// A cell in the rendered output.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Cell {
    Empty,
    Island(usize),
    HBridge(usize),
    VBridge(usize),
}

// Rendered output. Outer index is N-S, inner index is W-E.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Grid(Vec<Vec<Cell>>);

// At most this many parallel bridges between two islands.
const MAX_BRIDGES: usize = 2;

// Check the clock once every 1024 search nodes.
const CLOCK_CHECK_MASK: u64 = 0x3FF;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
enum SearchAbort {
    #[error("node limit of {0} reached")]
    NodeLimit(u64),
    #[error("time limit of {0:?} reached")]
    TimeLimit(Duration),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum SearchStatus {
    // The whole search tree was explored.
    Complete,
    // A limit was hit. Solutions found so far are still valid, but
    // there may be more.
    Incomplete(SearchAbort),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct SearchLimits {
    max_nodes: Option<u64>,
    time_limit: Option<Duration>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct SolverConfig {
    // Forbid the two-island components 1-1 and 2=2 during search.
    // Turning it off gives the same answers, just more slowly.
    structural_pruning: bool,
    limits: SearchLimits,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct SearchStats {
    // Tentative assignments tried.
    nodes: u64,
    // Complete assignments handed to the connectivity check.
    candidates: usize,
    // Candidates that turned out to be connected.
    accepted: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct SolveOutcome {
    status: SearchStatus,
    stats: SearchStats,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            structural_pruning: true,
            limits: SearchLimits::default(),
        }
    }
}

impl Orientation {
    // (row, col) step to the next cell.
    fn step(&self) -> (usize, usize) {
        match *self {
            Orientation::Horizontal => (0, 1),
            Orientation::Vertical => (1, 0),
        }
    }
}

impl Edge {
    fn other_end(&self, isle: usize) -> usize {
        if isle == self.a {
            self.b
        } else {
            self.a
        }
    }
}

impl SolveOutcome {
    fn is_complete(&self) -> bool {
        self.status == SearchStatus::Complete
    }
}

////////////////////////////////////////////////////////////////////////
// Parser and printer
//

// Only the digits 1-9 make islands. Everything else, '0' included, is
// water. We never reject input: a puzzle that makes no sense just has
// no solutions.
fn parse_cell(c: char) -> Option<usize> {
    match c.to_digit(10) {
        Some(n) if n >= 1 => Some(n as usize),
        _ => None,
    }
}

fn read_layout<'a, Iter: std::iter::Iterator<Item = &'a str>>(lines: Iter) -> Layout {
    let mut cells = Vec::new();
    let mut islands = Vec::new();

    for (row, line) in lines.enumerate() {
        let mut cell_row = Vec::new();
        for (col, c) in line.trim_end_matches('\r').chars().enumerate() {
            cell_row.push(parse_cell(c).map(|required| {
                islands.push(Island { row, col, required });
                islands.len() - 1
            }));
        }
        cells.push(cell_row);
    }

    Layout { cells, islands }
}

fn parse_puzzle(text: &str) -> Layout {
    read_layout(text.split('\n'))
}

impl Cell {
    // NB: Undisplayable cells (valence > 9, bridge count > 2) are silently converted to '?'.
    fn to_char(&self) -> char {
        match self {
            Cell::Empty => ' ',
            Cell::HBridge(1) => '-',
            Cell::HBridge(2) => '=',
            Cell::VBridge(1) => '|',
            Cell::VBridge(2) => 'H',
            Cell::Island(valence) if *valence <= 9 => {
                std::char::from_digit(*valence as u32, 10).unwrap_or('?')
            }
            _ => '?',
        }
    }
}

fn display_grid(grid: &Grid) -> String {
    grid.0
        .iter()
        .map(|row| row.iter().map(|c| c.to_char()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

////////////////////////////////////////////////////////////////////////
// Candidate edges
//

impl Layout {
    fn island_at(&self, row: usize, col: usize) -> Option<usize> {
        self.cells
            .get(row)
            .and_then(|cells| cells.get(col))
            .copied()
            .flatten()
    }

    // Walk east or south from the given cell until we hit an island or
    // fall off the grid.
    fn find_neighbour(&self, row: usize, col: usize, orientation: Orientation) -> Option<usize> {
        let (step_row, step_col) = orientation.step();
        let (mut idx_row, mut idx_col) = (row, col);
        loop {
            idx_row += step_row;
            idx_col += step_col;
            if idx_row >= self.cells.len() {
                return None;
            }
            if orientation == Orientation::Horizontal && idx_col >= self.cells[idx_row].len() {
                return None;
            }
            if let Some(isle) = self.island_at(idx_row, idx_col) {
                return Some(isle);
            }
        }
    }
}

impl Puzzle {
    // Does vertical edge 'v' pass strictly through the middle of
    // horizontal edge 'h'? Anything that isn't a vertical edge fails
    // the row test, so callers needn't filter.
    fn crosses(&self, h: &Edge, v: &Edge) -> bool {
        let (h_a, h_b) = (&self.islands[h.a], &self.islands[h.b]);
        let (v_a, v_b) = (&self.islands[v.a], &self.islands[v.b]);
        v_a.row < h_a.row && h_a.row < v_b.row && h_a.col < v_a.col && v_a.col < h_b.col
    }

    // Horizontal/vertical pairs of crossing edges, in (horizontal, vertical) form.
    #[cfg(test)]
    fn crossing_pairs(&self) -> Vec<(usize, usize)> {
        self.edges
            .iter()
            .filter(|e| e.orientation == Orientation::Horizontal)
            .flat_map(|e| self.crossings[e.index].iter().map(move |c| (e.index, *c)))
            .collect()
    }

    #[cfg(test)]
    fn degree(&self, isle: usize, solution: &Solution) -> usize {
        self.incident[isle].iter().map(|e| solution.0[*e]).sum()
    }
}

fn build_puzzle(layout: &Layout) -> Puzzle {
    let islands = layout.islands.clone();

    // The index counter is local to this call, so every solve numbers
    // its edges from zero.
    let mut edges: Vec<Edge> = Vec::new();
    for (idx, isle) in islands.iter().enumerate() {
        for orientation in ALL_ORIENTATIONS.iter().cloned() {
            if let Some(other) = layout.find_neighbour(isle.row, isle.col, orientation) {
                edges.push(Edge {
                    index: edges.len(),
                    a: idx,
                    b: other,
                    orientation,
                });
            }
        }
    }

    let mut incident = vec![Vec::new(); islands.len()];
    for edge in edges.iter() {
        incident[edge.a].push(edge.index);
        incident[edge.b].push(edge.index);
    }

    let mut puzzle = Puzzle {
        islands,
        edges,
        incident,
        crossings: Vec::new(),
    };

    let mut crossings = vec![Vec::new(); puzzle.edges.len()];
    for h in puzzle
        .edges
        .iter()
        .filter(|e| e.orientation == Orientation::Horizontal)
    {
        for v in puzzle.edges.iter() {
            if puzzle.crosses(h, v) {
                crossings[h.index].push(v.index);
                crossings[v.index].push(h.index);
            }
        }
    }
    puzzle.crossings = crossings;

    debug!(
        "{} islands, {} candidate edges, {} crossing pairs",
        puzzle.islands.len(),
        puzzle.edges.len(),
        puzzle.crossings.iter().map(Vec::len).sum::<usize>() / 2
    );

    puzzle
}

////////////////////////////////////////////////////////////////////////
// Constraints
//

// The largest bridge count each edge may take.
//
// With more than two islands, a 1-1 bridge or a 2=2 double bridge
// would finish both its islands off with nothing else attached, so
// those values can never be part of a connected solution. With just
// two islands that isolated pair *is* the solution.
fn edge_caps(puzzle: &Puzzle, structural_pruning: bool) -> Vec<usize> {
    let prune = structural_pruning && puzzle.islands.len() > 2;
    puzzle
        .edges
        .iter()
        .map(|e| {
            if !prune {
                return MAX_BRIDGES;
            }
            match (
                puzzle.islands[e.a].required,
                puzzle.islands[e.b].required,
            ) {
                (1, 1) => 0,
                (2, 2) => 1,
                _ => MAX_BRIDGES,
            }
        })
        .collect()
}

// Is the graph of edges with at least one bridge a single component
// covering every island? An empty puzzle has nothing to connect and
// doesn't count.
fn is_connected(puzzle: &Puzzle, solution: &Solution) -> bool {
    if puzzle.islands.is_empty() {
        return false;
    }

    let mut seen = vec![false; puzzle.islands.len()];
    let mut stack = vec![0];
    let mut reached = 1;
    seen[0] = true;

    while let Some(isle) = stack.pop() {
        for e in puzzle.incident[isle].iter() {
            if solution.0[*e] == 0 {
                continue;
            }
            let other = puzzle.edges[*e].other_end(isle);
            if !seen[other] {
                seen[other] = true;
                reached += 1;
                stack.push(other);
            }
        }
    }

    reached == puzzle.islands.len()
}

////////////////////////////////////////////////////////////////////////
// Solving algorithm
//

struct Search<'a, F> {
    puzzle: &'a Puzzle,
    caps: Vec<usize>,
    limits: &'a SearchLimits,
    started: Instant,
    bridges: Vec<usize>,
    // Bridge ends already placed at each island.
    placed: Vec<usize>,
    // Bridge ends each island could still get from unassigned edges.
    available: Vec<usize>,
    stats: SearchStats,
    on_solution: F,
}

impl<'a, F: FnMut(&Solution)> Search<'a, F> {
    fn new(puzzle: &'a Puzzle, config: &'a SolverConfig, on_solution: F) -> Search<'a, F> {
        let caps = edge_caps(puzzle, config.structural_pruning);
        let available = puzzle
            .incident
            .iter()
            .map(|edges| edges.iter().map(|e| caps[*e]).sum())
            .collect();

        debug!(
            "{} edges capped by structural pruning",
            caps.iter().filter(|cap| **cap < MAX_BRIDGES).count()
        );

        Search {
            puzzle,
            caps,
            limits: &config.limits,
            started: Instant::now(),
            bridges: vec![0; puzzle.edges.len()],
            placed: vec![0; puzzle.islands.len()],
            available,
            stats: SearchStats::default(),
            on_solution,
        }
    }

    // Count a search node, and bail out if we're over budget.
    fn tick(&mut self) -> Result<(), SearchAbort> {
        self.stats.nodes += 1;
        if let Some(max_nodes) = self.limits.max_nodes {
            if self.stats.nodes > max_nodes {
                return Err(SearchAbort::NodeLimit(max_nodes));
            }
        }
        if let Some(time_limit) = self.limits.time_limit {
            if self.stats.nodes & CLOCK_CHECK_MASK == 0 && self.started.elapsed() > time_limit {
                return Err(SearchAbort::TimeLimit(time_limit));
            }
        }
        Ok(())
    }

    // Can an island still reach exactly its valence?
    fn feasible(&self, isle: usize, extra: usize) -> bool {
        let required = self.puzzle.islands[isle].required;
        let placed = self.placed[isle] + extra;
        placed <= required && placed + self.available[isle] >= required
    }

    // Check putting n bridges on the edge against the constraints that
    // mention it. Unassigned edges hold 0, so a crossing partner that
    // hasn't been reached yet never conflicts.
    fn consistent(&self, edge: &Edge, n: usize) -> bool {
        self.feasible(edge.a, n)
            && self.feasible(edge.b, n)
            && (n == 0
                || self.puzzle.crossings[edge.index]
                    .iter()
                    .all(|c| self.bridges[*c] == 0))
    }

    fn set(&mut self, edge: &Edge, n: usize) {
        self.bridges[edge.index] = n;
        self.placed[edge.a] += n;
        self.placed[edge.b] += n;
    }

    fn unset(&mut self, edge: &Edge, n: usize) {
        self.bridges[edge.index] = 0;
        self.placed[edge.a] -= n;
        self.placed[edge.b] -= n;
    }

    fn check_candidate(&mut self) {
        self.stats.candidates += 1;
        let solution = Solution(self.bridges.clone());
        if is_connected(self.puzzle, &solution) {
            self.stats.accepted += 1;
            (self.on_solution)(&solution);
        } else {
            trace!("Rejected disconnected candidate {:?}", solution.0);
        }
    }

    // Assign edges from 'idx' onwards, trying bridge counts in
    // ascending order. Works by vanilla recursion, one level per edge.
    fn search(&mut self, idx: usize) -> Result<(), SearchAbort> {
        if idx == self.puzzle.edges.len() {
            // Every island's valence has been met exactly, or we'd have
            // pruned earlier.
            self.check_candidate();
            return Ok(());
        }

        let edge = self.puzzle.edges[idx];
        let cap = self.caps[idx];
        self.available[edge.a] -= cap;
        self.available[edge.b] -= cap;

        for n in 0..=cap {
            self.tick()?;
            if self.consistent(&edge, n) {
                self.set(&edge, n);
                let result = self.search(idx + 1);
                self.unset(&edge, n);
                result?;
            }
        }

        self.available[edge.a] += cap;
        self.available[edge.b] += cap;
        Ok(())
    }

    fn run(mut self) -> SolveOutcome {
        let puzzle = self.puzzle;
        // Catches islands that can never be satisfied, including any
        // with no candidate edges at all, before we start.
        let hopeless = puzzle.islands.is_empty()
            || (0..puzzle.islands.len()).any(|isle| !self.feasible(isle, 0));

        let status = if hopeless {
            SearchStatus::Complete
        } else {
            match self.search(0) {
                Ok(()) => SearchStatus::Complete,
                Err(abort) => SearchStatus::Incomplete(abort),
            }
        };

        debug!("Search finished: {:?}, {:?}", status, self.stats);

        SolveOutcome {
            status,
            stats: self.stats,
        }
    }
}

// Enumerate every connected solution, handing each to 'on_solution'
// in search order.
fn solve_with<F: FnMut(&Solution)>(
    puzzle: &Puzzle,
    config: &SolverConfig,
    on_solution: F,
) -> SolveOutcome {
    Search::new(puzzle, config, on_solution).run()
}

// Find all solutions.
#[cfg(test)]
fn solve(puzzle: &Puzzle) -> Vec<Solution> {
    let mut solutions = Vec::new();
    solve_with(puzzle, &SolverConfig::default(), |s| {
        solutions.push(s.clone())
    });
    solutions
}

// Parse, solve, and render each solution for 'display'.
fn solve_text<F: FnMut(&str)>(text: &str, config: &SolverConfig, mut display: F) -> SolveOutcome {
    let puzzle = build_puzzle(&parse_puzzle(text));
    solve_with(&puzzle, config, |solution| {
        display(&display_grid(&render(&puzzle, solution)))
    })
}

////////////////////////////////////////////////////////////////////////
// Rendering
//

impl Grid {
    fn new(height: usize, width: usize) -> Grid {
        Grid(vec![vec![Cell::Empty; width]; height])
    }

    fn paint(&mut self, row: usize, col: usize, brush: &Cell) {
        let cell = &mut self.0[row][col];
        // Candidate edges never pass over islands, and crossing edges
        // never both carry bridges, so there should be only water here.
        assert_eq!(*cell, Cell::Empty, "Painting over ({}, {})", row, col);
        *cell = brush.clone();
    }

    // Fill the cells strictly between the two islands.
    fn paint_bridge(&mut self, from: &Island, to: &Island, orientation: Orientation, n_bridges: usize) {
        match orientation {
            Orientation::Horizontal => {
                let brush = Cell::HBridge(n_bridges);
                for col in (from.col + 1)..to.col {
                    self.paint(from.row, col, &brush);
                }
            }
            Orientation::Vertical => {
                let brush = Cell::VBridge(n_bridges);
                for row in (from.row + 1)..to.row {
                    self.paint(row, from.col, &brush);
                }
            }
        }
    }
}

fn render(puzzle: &Puzzle, solution: &Solution) -> Grid {
    let height = puzzle.islands.iter().map(|i| i.row + 1).max().unwrap_or(0);
    let width = puzzle.islands.iter().map(|i| i.col + 1).max().unwrap_or(0);

    let mut grid = Grid::new(height, width);
    for isle in puzzle.islands.iter() {
        grid.0[isle.row][isle.col] = Cell::Island(isle.required);
    }
    for edge in puzzle.edges.iter() {
        let n_bridges = solution.0[edge.index];
        if n_bridges > 0 {
            grid.paint_bridge(
                &puzzle.islands[edge.a],
                &puzzle.islands[edge.b],
                edge.orientation,
                n_bridges,
            );
        }
    }
    grid
}

////////////////////////////////////////////////////////////////////////
// Main entry point
//

#[derive(Parser)]
#[clap(version = "0.1", author = "Simon Frankau <sgf@arbitrary.name>")]
#[clap(about = "Hashiwokakero (Bridges) puzzle solver, listing every solution")]
struct Opts {
    /// Input file. Uses stdin if none specified.
    #[clap(long)]
    input_file: Option<String>,
    /// Output file. Uses stdout if none specified.
    #[clap(long)]
    output_file: Option<String>,
    /// Give up after trying this many bridge assignments.
    #[clap(long)]
    node_limit: Option<u64>,
    /// Give up after searching for this many milliseconds.
    #[clap(long)]
    time_limit_ms: Option<u64>,
    /// Don't prune 1-1 and 2=2 pairs during search. Same results, slower.
    #[clap(long)]
    no_structural_pruning: bool,
    /// Log debugging information to stderr. RUST_LOG takes precedence.
    #[clap(short, long)]
    verbose: bool,
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter(None, level)
        .format_timestamp(None)
        .format_target(false);

    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    builder.init();
}

fn solver_config(opts: &Opts) -> SolverConfig {
    SolverConfig {
        structural_pruning: !opts.no_structural_pruning,
        limits: SearchLimits {
            max_nodes: opts.node_limit,
            time_limit: opts.time_limit_ms.map(Duration::from_millis),
        },
    }
}

fn read_input(opts: &Opts) -> Result<String> {
    let mut file: Box<dyn Read> = match &opts.input_file {
        Some(name) => Box::new(File::open(name)?),
        None => Box::new(stdin()),
    };

    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

fn open_output(opts: &Opts) -> Result<Box<dyn Write>> {
    Ok(match &opts.output_file {
        Some(name) => Box::new(BufWriter::new(File::create(name)?)),
        None => Box::new(stdout()),
    })
}

// Solutions are separated by a blank line, and each ends in a newline.
fn write_solution(out: &mut dyn Write, first: bool, grid: &str) -> Result<()> {
    if !first {
        out.write_all(b"\n")?;
    }
    out.write_all(grid.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();
    init_logger(opts.verbose);

    let config = solver_config(&opts);
    let input = read_input(&opts)?;
    let mut output = open_output(&opts)?;

    // The visitor can't return errors, so hang on to the first one and
    // stop writing after it.
    let mut written = 0;
    let mut write_result: Result<()> = Ok(());
    let outcome = solve_text(&input, &config, |grid| {
        if write_result.is_ok() {
            write_result = write_solution(output.as_mut(), written == 0, grid);
            written += 1;
        }
    });
    write_result?;
    output.flush()?;

    info!(
        "{} solution(s) from {} candidate(s) in {} nodes",
        outcome.stats.accepted, outcome.stats.candidates, outcome.stats.nodes
    );

    if outcome.stats.accepted > 0 {
        eprintln!("{} solution(s)", outcome.stats.accepted);
    } else if outcome.is_complete() {
        eprintln!("No solutions");
    }

    if let SearchStatus::Incomplete(reason) = outcome.status {
        bail!(
            "Search incomplete: {}. {} solution(s) found before stopping",
            reason,
            outcome.stats.accepted
        );
    }

    Ok(())
}

////////////////////////////////////////////////////////////////////////
// Tests
//
