use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::game::config::GameConfig;
use crate::game::score::Score;
use crate::save::{SaveError, SaveState, SavedCell, SavedSelector};

use super::ball::{Ball, BallId};
use super::cell::Cell;
use super::coord::GridCoord;
use super::hazard::HazardLine;
use super::intent::SegmentChoice;
use super::segment::Side;
use super::turn::{TurnPhase, TurnReport};

/// An ambiguous junction waiting for the player: the side has several
/// outgoing segments and the planned track stops there until resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenSelector {
    pub coord: GridCoord,
    pub side: Side,
    /// Exit sides the player can choose between.
    pub directions: SmallVec<[Side; 3]>,
    /// Arrival order of the planned track needing this decision.
    pub step: u32,
}

/// Disposable planning clone of a live ball. The look-ahead only ever
/// moves these; the authoritative balls are untouched until the turn
/// actually advances.
#[derive(Clone, Copy, Debug)]
struct PlanBall {
    color: u8,
    coord: GridCoord,
    from_side: Side,
    segment: Option<u8>,
}

/// The playfield: a toroidal grid of track cells, the balls riding
/// them, the look-ahead plan, and the turn state machine. All mutation
/// happens through turn-synchronous calls; there is no interior
/// concurrency.
pub struct Board {
    size: i32,
    /// Row-major, `y * size + x`.
    cells: Vec<Cell>,
    balls: SlotMap<BallId, Ball>,
    /// Destroyed balls in death order, kept for reincarnation.
    dead: Vec<Ball>,
    /// Balls that will meet mid-segment during the current advance.
    on_collision_course: Vec<BallId>,
    open_selectors: Vec<OpenSelector>,
    /// Selector colors the player resolved this turn; their balls stop
    /// reopening selectors until the turn ends.
    resolved_colors: Vec<u8>,
    /// The next cell to be placed by the player.
    hand: Option<Cell>,
    placed_this_turn: bool,
    phase: TurnPhase,
    hazard: HazardLine,
    score: Score,
    report: TurnReport,
    config: GameConfig,
    rng: Pcg32,
}

impl Board {
    pub fn new_game(config: GameConfig, seed: u64) -> Self {
        let config = config.sanitized();
        let size = config.field_size;
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut cells = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let mut cell = Cell::random(&mut rng);
                cell.coord = GridCoord::new(x, y);
                cells.push(cell);
            }
        }
        let mut board = Self {
            size,
            cells,
            balls: SlotMap::with_key(),
            dead: Vec::new(),
            on_collision_course: Vec::new(),
            open_selectors: Vec::new(),
            resolved_colors: Vec::new(),
            hand: None,
            placed_this_turn: false,
            phase: TurnPhase::Planning,
            hazard: HazardLine::new(size, config.hazard_start, config.hazard_step),
            score: Score::default(),
            report: TurnReport::default(),
            config,
            rng,
        };
        board.create_initial_balls();
        board.hand = Some(Cell::random(&mut board.rng));
        board.plan();
        log::info!(
            "new game: {size}x{size} grid, {} balls",
            board.balls.len()
        );
        board
    }

    /// One ball per odd column on the third row, as many as there are
    /// colors available.
    fn create_initial_balls(&mut self) {
        let count = ((self.size - 1) / 2).min(self.config.colors as i32);
        for k in 0..count {
            let coord = GridCoord::new(2 * k + 1, 2);
            let segment = self.cell_at(coord).startup_bottom_segment();
            let _ = self
                .balls
                .insert(Ball::new((k + 1) as u8, coord, segment, Side::Bottom));
        }
    }

    // --- Accessors ---

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn hazard(&self) -> &HazardLine {
        &self.hazard
    }

    pub fn cell(&self, coord: GridCoord) -> Option<&Cell> {
        coord
            .in_bounds(self.size)
            .then(|| &self.cells[(coord.y * self.size + coord.x) as usize])
    }

    pub fn cell_in_hand(&self) -> Option<&Cell> {
        self.hand.as_ref()
    }

    pub fn balls(&self) -> impl Iterator<Item = (BallId, &Ball)> {
        self.balls.iter()
    }

    pub fn ball(&self, id: BallId) -> Option<&Ball> {
        self.balls.get(id)
    }

    pub fn live_balls(&self) -> usize {
        self.balls.len()
    }

    /// True while the current advance will destroy this ball mid-segment.
    pub fn is_on_collision_course(&self, id: BallId) -> bool {
        self.on_collision_course.contains(&id)
    }

    /// Junctions currently waiting for the player, earliest-needed first.
    pub fn open_selectors(&self) -> &[OpenSelector] {
        &self.open_selectors
    }

    fn index(&self, coord: GridCoord) -> usize {
        (coord.y * self.size + coord.x) as usize
    }

    fn cell_at(&self, coord: GridCoord) -> &Cell {
        &self.cells[self.index(coord)]
    }

    /// The same physical edge seen from the adjacent cell, wrapping at
    /// the grid edges.
    fn neighbor(&self, coord: GridCoord, side: Side) -> (GridCoord, Side) {
        (coord.step(side, self.size), side.opposite())
    }

    fn same_boundary(&self, a: (GridCoord, Side), b: (GridCoord, Side)) -> bool {
        a == b || self.neighbor(a.0, a.1) == b
    }

    // --- Planning ---

    /// Rebuild the full look-ahead: every intent, every segment color
    /// and the open selector list, from the live balls alone. Selector
    /// choices persist unless no matching track wants them anymore.
    fn plan(&mut self) {
        for cell in &mut self.cells {
            cell.clear_intents();
            cell.clear_segment_colors();
        }
        self.open_selectors.clear();

        let mut working: Vec<PlanBall> = self
            .balls
            .values()
            .map(|b| PlanBall {
                color: b.color,
                coord: b.coord,
                from_side: b.from_side,
                segment: b.segment,
            })
            .collect();
        // Ball order decides who claims a contested side within one
        // step; sort by color so plans are stable across save/restore.
        working.sort_by_key(|b| b.color);

        let mut step = 1u32;
        while !working.is_empty() {
            self.remove_boundary_collided(&mut working);
            let mut survivors = Vec::with_capacity(working.len());
            for mut b in working {
                if !self.record_intent(&mut b, step) {
                    survivors.push(b);
                }
            }
            working = survivors;
            self.remove_shared_segment(&mut working);
            for b in &mut working {
                self.advance_plan_ball(b);
            }
            step += 1;
        }

        for idx in 0..self.cells.len() {
            for side in Side::ALL {
                let default = self.cells[idx].default_choice(side);
                let intent = self.cells[idx].intent_mut(side);
                if intent.selector_color != 0 && intent.selector_color != intent.color {
                    intent.reset_selector(default);
                }
            }
            Self::color_cell_segments(&mut self.cells[idx]);
        }
        self.open_selectors.sort_by_key(|s| s.step);
        self.phase = if self.phase == TurnPhase::Advancing {
            TurnPhase::Advancing
        } else if !self.open_selectors.is_empty() {
            TurnPhase::AwaitingSelectors
        } else if self.placed_this_turn {
            TurnPhase::Ready
        } else {
            TurnPhase::Planning
        };
        log::debug!(
            "planned {} steps ahead, {} open selectors",
            step - 1,
            self.open_selectors.len()
        );
    }

    /// Record the ball's intent at its current side. Returns true when
    /// planning for this ball stops here: the boundary is already owned
    /// by another track, or the ball has no segment to continue on.
    fn record_intent(&mut self, b: &mut PlanBall, step: u32) -> bool {
        let (ncoord, nside) = self.neighbor(b.coord, b.from_side);
        let neighbor_claimed = self.cell_at(ncoord).intent(nside).color != 0;
        let idx = self.index(b.coord);
        let default = self.cells[idx].default_choice(b.from_side);

        let needs_selector = {
            let intent = self.cells[idx].intent_mut(b.from_side);
            if intent.color != 0 || neighbor_claimed {
                return true;
            }
            intent.color = b.color;
            intent.step = step;
            if let Some(seg) = b.segment {
                // The ball already knows its direction.
                intent.choice = SegmentChoice::Decided(seg);
            } else if let Some(seg) = intent.choice.segment() {
                // The side has an established direction; adopt it.
                b.segment = Some(seg);
            } else {
                // Fall through to the player's junction choice.
                if intent.selector_color != b.color {
                    intent.reset_selector(default);
                    intent.selector_color = b.color;
                }
                intent.choice = intent.selector;
                b.segment = intent.selector.segment();
            }
            b.segment.is_none()
        };

        if needs_selector {
            if !self.resolved_colors.contains(&b.color) {
                let directions = self.cells[idx].directions_from(b.from_side);
                self.open_selectors.push(OpenSelector {
                    coord: b.coord,
                    side: b.from_side,
                    directions,
                    step,
                });
            }
            return true;
        }
        false
    }

    /// Remove every ball pair meeting head-on at the same physical edge
    /// this step. Both journeys end here.
    fn remove_boundary_collided(&self, working: &mut Vec<PlanBall>) {
        let mut doomed = vec![false; working.len()];
        for i in 0..working.len() {
            for j in (i + 1)..working.len() {
                let (a, b) = (&working[i], &working[j]);
                if self.same_boundary((a.coord, a.from_side), (b.coord, b.from_side)) {
                    doomed[i] = true;
                    doomed[j] = true;
                }
            }
        }
        let mut i = 0;
        working.retain(|_| {
            let keep = !doomed[i];
            i += 1;
            keep
        });
    }

    /// Remove every ball pair assigned to the same segment: they entered
    /// from its two ends and will meet in the middle.
    fn remove_shared_segment(&self, working: &mut Vec<PlanBall>) {
        let mut doomed = vec![false; working.len()];
        for i in 0..working.len() {
            for j in (i + 1)..working.len() {
                let (a, b) = (&working[i], &working[j]);
                if a.segment.is_some() && a.coord == b.coord && a.segment == b.segment {
                    doomed[i] = true;
                    doomed[j] = true;
                }
            }
        }
        let mut i = 0;
        working.retain(|_| {
            let keep = !doomed[i];
            i += 1;
            keep
        });
    }

    /// Move a planning clone to the start of the next cell along its
    /// resolved segment.
    fn advance_plan_ball(&self, b: &mut PlanBall) {
        let Some(seg) = b.segment else { return };
        let shape = self.cell_at(b.coord).segments[seg as usize].shape;
        let Some(exit) = shape.other_side(b.from_side) else {
            return;
        };
        let (ncoord, nside) = self.neighbor(b.coord, exit);
        b.coord = ncoord;
        b.from_side = nside;
        b.segment = self.segment_from_intent(ncoord, nside, b.color);
    }

    /// The segment a ball of `color` entering `side` will ride, if the
    /// side's intent or a matching player choice already fixes one.
    fn segment_from_intent(&self, coord: GridCoord, side: Side, color: u8) -> Option<u8> {
        let intent = self.cell_at(coord).intent(side);
        intent.choice.segment().or(if intent.selector_color == color {
            intent.selector.segment()
        } else {
            None
        })
    }

    /// Resolve a segment's two colors from the intents at its ends.
    /// One-sided claims own the whole segment; on both-sided claims the
    /// older (smaller nonzero step) wins, and only equal-aged claims of
    /// different colors truly split the segment in the middle.
    fn color_cell_segments(cell: &mut Cell) {
        let mut touched: SmallVec<[u8; 4]> = SmallVec::new();
        for side in Side::ALL {
            if let Some(seg) = cell.intent(side).choice.segment() {
                if !touched.contains(&seg) {
                    touched.push(seg);
                }
            }
        }
        for seg_idx in touched {
            let [s0, s1] = cell.segments[seg_idx as usize].shape.sides();
            let (c0, step0, claims0) = {
                let i = cell.intent(s0);
                (i.color, i.step, i.choice.segment() == Some(seg_idx))
            };
            let (c1, step1, claims1) = {
                let i = cell.intent(s1);
                (i.color, i.step, i.choice.segment() == Some(seg_idx))
            };
            let seg = &mut cell.segments[seg_idx as usize];
            if claims0 && !claims1 {
                seg.colors = [c0, c0];
                seg.split = 0.0;
            } else if claims1 && !claims0 {
                seg.colors = [c1, c1];
                seg.split = 0.0;
            } else if c0 == 0 || c0 == c1 || (step0 > step1 && step1 > 0) {
                seg.colors = [c1, c1];
                seg.split = 0.0;
            } else if c1 == 0 || (step1 > step0 && step0 > 0) {
                seg.colors = [c0, c0];
                seg.split = 0.0;
            } else {
                seg.colors = [c0, c1];
                seg.split = 0.5;
            }
        }
    }

    // --- Player operations ---

    /// Put the cell in hand onto the board, replacing whatever was
    /// there. Balls on the replaced cell stay and re-resolve their
    /// direction against the new topology. One placement per turn.
    pub fn place_cell(&mut self, coord: GridCoord) -> bool {
        if self.phase == TurnPhase::Advancing || self.placed_this_turn {
            return false;
        }
        if !coord.in_bounds(self.size) {
            return false;
        }
        let Some(mut cell) = self.hand.take() else {
            return false;
        };
        cell.coord = coord;
        let idx = self.index(coord);
        self.cells[idx] = cell;
        for ball in self.balls.values_mut() {
            if ball.coord == coord {
                ball.segment = None;
            }
        }
        self.placed_this_turn = true;
        self.plan();
        true
    }

    /// Resolve an open junction: route the track entering `side` toward
    /// the `direction` side. Unknown junctions or directions are
    /// silently ignored. The choice persists across re-planning until
    /// the track no longer wants this side.
    pub fn resolve_selector(&mut self, coord: GridCoord, side: Side, direction: Side) -> bool {
        let open = self
            .open_selectors
            .iter()
            .any(|s| s.coord == coord && s.side == side && s.directions.contains(&direction));
        if !open {
            return false;
        }
        let Some(cell) = self.cell(coord) else {
            return false;
        };
        let Some(seg) = cell.segment_toward(side, direction) else {
            return false;
        };
        let idx = self.index(coord);
        let intent = self.cells[idx].intent_mut(side);
        intent.selector = SegmentChoice::Decided(seg);
        let color = intent.selector_color;
        if color != 0 && !self.resolved_colors.contains(&color) {
            self.resolved_colors.push(color);
        }
        self.plan();
        true
    }

    /// A coordinate for dropping a random cell: prefer cells that carry
    /// a planned track, fall back to anywhere.
    pub fn suggest_placement(&mut self) -> GridCoord {
        let colored: Vec<GridCoord> = self
            .cells
            .iter()
            .filter(|c| c.segments.iter().any(|s| !s.is_uncolored()))
            .map(|c| c.coord)
            .collect();
        if colored.is_empty() {
            let x = self.rng.random_range(0..self.size);
            let y = self.rng.random_range(0..self.size);
            GridCoord::new(x, y)
        } else {
            colored[self.rng.random_range(0..colored.len())]
        }
    }

    fn drop_random_cell(&mut self, coord: GridCoord) {
        let mut cell = Cell::random(&mut self.rng);
        cell.coord = coord;
        let idx = self.index(coord);
        self.cells[idx] = cell;
        for ball in self.balls.values_mut() {
            if ball.coord == coord {
                ball.segment = None;
            }
        }
    }

    // --- Turn advancement ---

    /// Commit the turn: real same-side collisions are resolved, every
    /// ball's segment is fixed from the plan, and balls sharing a
    /// segment are marked to die mid-move.
    pub fn begin_advance(&mut self) -> bool {
        if self.phase != TurnPhase::Ready {
            return false;
        }
        self.phase = TurnPhase::Advancing;
        self.report = TurnReport::default();
        self.kill_boundary_collided();

        let ids: Vec<BallId> = self.balls.keys().collect();
        for id in ids {
            let Some(b) = self.balls.get(id) else { continue };
            let (coord, side, color) = (b.coord, b.from_side, b.color);
            let segment = match b.segment {
                Some(s) => Some(s),
                None => self.segment_from_intent(coord, side, color),
            };
            if let Some(b) = self.balls.get_mut(id) {
                b.segment = segment;
                b.progress = 0.0;
            }
        }
        self.on_collision_course = self.shared_segment_balls();
        let rows = self.ball_rows();
        self.hazard.snapshot(rows);
        true
    }

    /// Presentational position update during the advance. Once past the
    /// midpoint, balls on a collision course have met and die.
    pub fn set_progress(&mut self, progress: f32) {
        if self.phase != TurnPhase::Advancing {
            return;
        }
        let t = progress.clamp(0.0, 1.0);
        for ball in self.balls.values_mut() {
            ball.progress = t;
        }
        if t >= 0.5 && !self.on_collision_course.is_empty() {
            let doomed = std::mem::take(&mut self.on_collision_course);
            for id in doomed {
                self.kill_ball(id);
            }
        }
    }

    /// Land every ball on its next cell, run the hazard sweep and
    /// reincarnation, drop the extra cells, hand out the next cell and
    /// re-plan for the new turn.
    pub fn finish_advance(&mut self) -> Option<TurnReport> {
        if self.phase != TurnPhase::Advancing {
            return None;
        }
        self.set_progress(1.0);
        let ids: Vec<BallId> = self.balls.keys().collect();
        for id in ids {
            self.advance_ball(id);
        }
        self.kill_boundary_collided();

        self.report.scrolled = self.hazard.advance();
        let rows = self.ball_rows();
        let swept = self.hazard.swept(rows);
        if !swept.is_empty() {
            log::debug!("hazard line swept colors {swept:?}");
            let doomed: Vec<BallId> = self
                .balls
                .iter()
                .filter(|(_, b)| swept.contains(&b.color))
                .map(|(id, _)| id)
                .collect();
            for id in doomed {
                self.kill_ball(id);
            }
        }

        self.resolved_colors.clear();
        self.score.increment_moves();
        if self.config.reincarnation {
            self.reincarnate();
        }
        for _ in 0..self.config.extra_moves {
            let coord = self.suggest_placement();
            self.drop_random_cell(coord);
        }
        self.hand = Some(Cell::random(&mut self.rng));
        self.placed_this_turn = false;
        self.phase = TurnPhase::Planning;
        self.plan();
        Some(std::mem::take(&mut self.report))
    }

    /// The whole advance in one synchronous call. Returns None unless
    /// the turn was ready to commit.
    pub fn advance_turn(&mut self) -> Option<TurnReport> {
        if !self.begin_advance() {
            return None;
        }
        self.set_progress(0.5);
        self.finish_advance()
    }

    /// Move a ball to the start of the next cell along its segment. A
    /// ball with no resolved segment parks where it is.
    fn advance_ball(&mut self, id: BallId) {
        let Some(b) = self.balls.get(id) else { return };
        let (coord, from_side, color) = (b.coord, b.from_side, b.color);
        let Some(seg) = b
            .segment
            .or_else(|| self.segment_from_intent(coord, from_side, color))
        else {
            return;
        };
        let shape = self.cell_at(coord).segments[seg as usize].shape;
        let Some(exit) = shape.other_side(from_side) else {
            return;
        };
        let (ncoord, nside) = self.neighbor(coord, exit);
        let next = self.segment_from_intent(ncoord, nside, color);
        if let Some(b) = self.balls.get_mut(id) {
            b.coord = ncoord;
            b.from_side = nside;
            b.segment = next;
            b.progress = 0.0;
        }
    }

    // --- Deaths and rebirths ---

    fn kill_ball(&mut self, id: BallId) {
        if let Some(ball) = self.balls.remove(id) {
            log::debug!(
                "ball {} destroyed at ({}, {})",
                ball.color,
                ball.coord.x,
                ball.coord.y
            );
            self.report.destroyed.push(ball.color);
            self.dead.push(ball);
        }
    }

    /// Destroy every ball pair occupying the same physical edge, the
    /// same rule the planner applies to its clones, now on real state.
    fn kill_boundary_collided(&mut self) {
        let entries: Vec<(BallId, GridCoord, Side)> = self
            .balls
            .iter()
            .map(|(id, b)| (id, b.coord, b.from_side))
            .collect();
        let mut doomed = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                if self.same_boundary(
                    (entries[i].1, entries[i].2),
                    (entries[j].1, entries[j].2),
                ) {
                    doomed.push(entries[i].0);
                    doomed.push(entries[j].0);
                }
            }
        }
        for id in doomed {
            self.kill_ball(id);
        }
    }

    /// Destroy all balls matching the predicate; used by external
    /// collaborators reporting kills. Returns the destroyed colors and
    /// re-plans around the survivors.
    pub fn kill_balls_matching(&mut self, pred: impl Fn(&Ball) -> bool) -> Vec<u8> {
        let doomed: Vec<(BallId, u8)> = self
            .balls
            .iter()
            .filter(|(_, b)| pred(b))
            .map(|(id, b)| (id, b.color))
            .collect();
        let mut colors = Vec::with_capacity(doomed.len());
        for (id, color) in doomed {
            self.kill_ball(id);
            colors.push(color);
        }
        if !colors.is_empty() && self.phase != TurnPhase::Advancing {
            self.plan();
        }
        colors
    }

    /// Bring destroyed balls back onto free track: candidate segments
    /// carry no color and sit on unoccupied cells, ranked farthest from
    /// the hazard line first. One ball per cell, oldest death first.
    fn reincarnate(&mut self) {
        if self.dead.is_empty() {
            return;
        }
        let occupied: HashSet<GridCoord> = self.balls.values().map(|b| b.coord).collect();
        struct Candidate {
            coord: GridCoord,
            side: Side,
            segment: u8,
            dist: f32,
        }
        let mut candidates: Vec<Candidate> = Vec::new();
        for cell in &self.cells {
            if occupied.contains(&cell.coord) {
                continue;
            }
            for (i, seg) in cell.segments.iter().enumerate() {
                if !seg.is_uncolored() {
                    continue;
                }
                let row = cell.coord.y as f32 + seg.point_at(0.5).y;
                candidates.push(Candidate {
                    coord: cell.coord,
                    side: seg.shape.sides()[0],
                    segment: i as u8,
                    dist: self.hazard.distance_to(row).abs(),
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.dist
                .partial_cmp(&a.dist)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.coord.y.cmp(&b.coord.y))
                .then(a.coord.x.cmp(&b.coord.x))
        });
        let mut used: HashSet<GridCoord> = HashSet::new();
        let mut next = 0usize;
        while !self.dead.is_empty() && next < candidates.len() {
            let c = &candidates[next];
            next += 1;
            if !used.insert(c.coord) {
                continue;
            }
            let ball = self.dead.remove(0);
            log::debug!("ball {} reborn at ({}, {})", ball.color, c.coord.x, c.coord.y);
            self.report.reborn.push(ball.color);
            let _ = self.balls.insert(Ball {
                color: ball.color,
                coord: c.coord,
                segment: Some(c.segment),
                progress: 0.0,
                from_side: c.side,
            });
        }
    }

    // --- Hazard support ---

    /// Fractional field row of a ball, cell row plus its position along
    /// the segment in unit geometry.
    fn ball_row(&self, b: &Ball) -> f32 {
        let frac = match b.segment {
            Some(i) => {
                let seg = &self.cell_at(b.coord).segments[i as usize];
                seg.point_at(seg.split_for(b.from_side, b.progress)).y
            }
            None => b.from_side.unit_midpoint().y,
        };
        b.coord.y as f32 + frac
    }

    fn ball_rows(&self) -> Vec<(u8, f32)> {
        self.balls
            .values()
            .map(|b| (b.color, self.ball_row(b)))
            .collect()
    }

    /// Ids of live balls assigned to the same segment as another ball.
    fn shared_segment_balls(&self) -> Vec<BallId> {
        let entries: Vec<(BallId, GridCoord, Option<u8>)> = self
            .balls
            .iter()
            .map(|(id, b)| (id, b.coord, b.segment))
            .collect();
        let mut out = Vec::new();
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                if entries[i].2.is_some()
                    && entries[i].1 == entries[j].1
                    && entries[i].2 == entries[j].2
                {
                    if !out.contains(&entries[i].0) {
                        out.push(entries[i].0);
                    }
                    if !out.contains(&entries[j].0) {
                        out.push(entries[j].0);
                    }
                }
            }
        }
        out
    }

    // --- Persistence ---

    /// Serializable image of the game between turns. Derived plan state
    /// is omitted; the first plan after `restore` rebuilds it.
    pub fn snapshot(&self) -> SaveState {
        let mut balls: Vec<Ball> = self.balls.values().cloned().collect();
        balls.sort_by_key(|b| b.color);
        SaveState {
            config: self.config,
            score: self.score,
            hazard_y: self.hazard.y(),
            cells: self
                .cells
                .iter()
                .map(|cell| SavedCell {
                    shapes: cell.segments.iter().map(|s| s.shape).collect(),
                    selectors: Side::ALL.map(|side| {
                        let intent = cell.intent(side);
                        SavedSelector {
                            color: intent.selector_color,
                            segment: match intent.selector {
                                SegmentChoice::Decided(i) => Some(i),
                                _ => None,
                            },
                        }
                    }),
                })
                .collect(),
            hand: self
                .hand
                .as_ref()
                .map(|c| c.segments.iter().map(|s| s.shape).collect()),
            balls,
            dead_balls: self.dead.clone(),
            resolved_colors: self.resolved_colors.clone(),
        }
    }

    /// Rebuild a board from a validated snapshot. Nothing is mutated on
    /// failure; the caller keeps whatever board it had.
    pub fn restore(state: &SaveState, seed: u64) -> Result<Self, SaveError> {
        state.validate()?;
        let config = state.config;
        let size = config.field_size;
        let mut cells = Vec::with_capacity(state.cells.len());
        for (idx, saved) in state.cells.iter().enumerate() {
            let Some(mut cell) = Cell::from_shapes(&saved.shapes) else {
                return Err(SaveError::Inconsistent("cell leaves a side uncovered"));
            };
            cell.coord = GridCoord::new(idx as i32 % size, idx as i32 / size);
            for side in Side::ALL {
                let sel = saved.selectors[side.index()];
                let intent = cell.intent_mut(side);
                intent.selector_color = sel.color;
                if let Some(seg) = sel.segment {
                    intent.selector = SegmentChoice::Decided(seg);
                }
            }
            cells.push(cell);
        }
        let hand = match &state.hand {
            Some(shapes) => match Cell::from_shapes(shapes) {
                Some(cell) => Some(cell),
                None => return Err(SaveError::Inconsistent("cell leaves a side uncovered")),
            },
            None => None,
        };
        let mut balls = SlotMap::with_key();
        let mut sorted = state.balls.clone();
        sorted.sort_by_key(|b| b.color);
        for ball in sorted {
            let _ = balls.insert(ball);
        }
        let mut board = Self {
            size,
            cells,
            balls,
            dead: state.dead_balls.clone(),
            on_collision_course: Vec::new(),
            open_selectors: Vec::new(),
            resolved_colors: state.resolved_colors.clone(),
            hand,
            placed_this_turn: false,
            phase: TurnPhase::Planning,
            hazard: HazardLine::new(size, state.hazard_y, config.hazard_step),
            score: state.score,
            report: TurnReport::default(),
            config,
            rng: Pcg32::seed_from_u64(seed),
        };
        board.plan();
        log::info!(
            "restored game: {size}x{size} grid, {} balls, move {}",
            board.balls.len(),
            board.score.moves()
        );
        Ok(board)
    }
}

#[cfg(test)]
impl Board {
    /// Board where every cell carries the same shapes, with a matching
    /// cell in hand and no balls. Tests drive planning explicitly.
    fn uniform(config: GameConfig, shapes: &[crate::sim::segment::SegmentShape]) -> Self {
        let config = config.sanitized();
        let size = config.field_size;
        let mut cells = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let mut cell = Cell::from_shapes(shapes).expect("test shapes cover all sides");
                cell.coord = GridCoord::new(x, y);
                cells.push(cell);
            }
        }
        Self {
            size,
            cells,
            balls: SlotMap::with_key(),
            dead: Vec::new(),
            on_collision_course: Vec::new(),
            open_selectors: Vec::new(),
            resolved_colors: Vec::new(),
            hand: Some(Cell::from_shapes(shapes).expect("test shapes cover all sides")),
            placed_this_turn: false,
            phase: TurnPhase::Planning,
            hazard: HazardLine::new(size, config.hazard_start, config.hazard_step),
            score: Score::default(),
            report: TurnReport::default(),
            config,
            rng: Pcg32::seed_from_u64(1),
        }
    }

    fn spawn(&mut self, color: u8, coord: GridCoord, segment: Option<u8>, from_side: Side) -> BallId {
        self.balls.insert(Ball {
            color,
            coord,
            segment,
            progress: 0.0,
            from_side,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::segment::SegmentShape;

    /// Straight cross: every side has exactly one outgoing segment.
    const CROSS: [SegmentShape; 2] = [SegmentShape::LineBT, SegmentShape::LineLR];
    /// Three exits from the bottom side: vertical line plus both bottom arcs.
    const FORK: [SegmentShape; 3] = [
        SegmentShape::LineBT,
        SegmentShape::ArcBL,
        SegmentShape::ArcRB,
    ];

    fn quiet_config() -> GameConfig {
        GameConfig {
            extra_moves: 0,
            ..GameConfig::default()
        }
    }

    #[test]
    fn plan_with_no_balls_returns_immediately() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        board.plan();
        assert!(board.open_selectors().is_empty());
        assert_eq!(board.phase(), TurnPhase::Planning);
        for cell in &board.cells {
            for side in Side::ALL {
                assert_eq!(cell.intent(side).color, 0);
            }
        }
    }

    #[test]
    fn single_exit_side_needs_no_selector() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        let id = board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        board.plan();

        assert!(board.open_selectors().is_empty());
        let intent = board.cell_at(GridCoord::new(3, 3)).intent(Side::Bottom);
        assert_eq!(intent.color, 1);
        assert_eq!(intent.step, 1);
        assert_eq!(intent.choice.segment(), Some(0));
        let seg = &board.cell_at(GridCoord::new(3, 3)).segments[0];
        assert_eq!(seg.colors, [1, 1]);
        assert_eq!(seg.split, 0.0);
        // Planning works on clones; the real ball is untouched.
        assert_eq!(board.ball(id).map(|b| b.segment), Some(None));
    }

    #[test]
    fn straight_track_claims_whole_column_then_stops() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        board.plan();

        // The track loops the torus column and stops when it reaches its
        // own first claim again: seven bottom sides, steps 1..=7.
        let mut steps = Vec::new();
        for y in 0..7 {
            let intent = board.cell_at(GridCoord::new(3, y)).intent(Side::Bottom);
            assert_eq!(intent.color, 1);
            steps.push(intent.step);
        }
        steps.sort_unstable();
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn claimed_boundary_has_silent_far_side() {
        for seed in [7u64, 42, 1234] {
            let board = Board::new_game(GameConfig::default(), seed);
            for cell in &board.cells {
                for side in Side::ALL {
                    if cell.intent(side).color == 0 {
                        continue;
                    }
                    let (ncoord, nside) = board.neighbor(cell.coord, side);
                    assert_eq!(
                        board.cell_at(ncoord).intent(nside).color,
                        0,
                        "both ends of one edge claimed at ({}, {}) {side:?}",
                        cell.coord.x,
                        cell.coord.y
                    );
                }
            }
        }
    }

    #[test]
    fn head_on_same_segment_splits_colors_and_kills_both() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        let a = board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        let b = board.spawn(2, GridCoord::new(3, 3), None, Side::Top);
        board.plan();

        let seg = &board.cell_at(GridCoord::new(3, 3)).segments[0];
        assert_eq!(seg.colors, [1, 2]);
        assert_eq!(seg.split, 0.5);

        assert!(board.place_cell(GridCoord::new(0, 0)));
        assert_eq!(board.phase(), TurnPhase::Ready);
        assert!(board.begin_advance());
        assert!(board.is_on_collision_course(a));
        assert!(board.is_on_collision_course(b));

        board.set_progress(0.5);
        assert_eq!(board.live_balls(), 0);
        let report = board.finish_advance().expect("advancing");
        assert!(report.destroyed.contains(&1));
        assert!(report.destroyed.contains(&2));
    }

    #[test]
    fn head_on_at_shared_edge_drops_both_from_plan() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        board.spawn(1, GridCoord::new(3, 3), None, Side::Top);
        board.spawn(2, GridCoord::new(3, 4), None, Side::Bottom);
        board.plan();

        assert!(board.open_selectors().is_empty());
        for cell in &board.cells {
            for side in Side::ALL {
                assert_eq!(cell.intent(side).color, 0);
            }
        }
    }

    #[test]
    fn fork_opens_selector_and_resolution_persists() {
        let mut board = Board::uniform(quiet_config(), &FORK);
        board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        board.plan();

        assert_eq!(board.phase(), TurnPhase::AwaitingSelectors);
        assert_eq!(board.open_selectors().len(), 1);
        let sel = &board.open_selectors()[0];
        assert_eq!(sel.coord, GridCoord::new(3, 3));
        assert_eq!(sel.side, Side::Bottom);
        assert_eq!(sel.step, 1);
        assert_eq!(sel.directions.len(), 3);

        assert!(board.resolve_selector(GridCoord::new(3, 3), Side::Bottom, Side::Left));
        assert!(board.open_selectors().is_empty());
        let intent = board.cell_at(GridCoord::new(3, 3)).intent(Side::Bottom);
        assert_eq!(intent.selector_color, 1);
        assert_eq!(intent.selector, SegmentChoice::Decided(1));
        assert_eq!(intent.choice.segment(), Some(1));

        // No track wants the side anymore: the choice is dropped.
        assert_eq!(board.kill_balls_matching(|b| b.color == 1), vec![1]);
        let intent = board.cell_at(GridCoord::new(3, 3)).intent(Side::Bottom);
        assert_eq!(intent.selector_color, 0);
        assert_eq!(intent.selector, SegmentChoice::Undecided);
    }

    #[test]
    fn resolve_selector_ignores_unknown_junctions() {
        let mut board = Board::uniform(quiet_config(), &FORK);
        board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        board.plan();

        assert!(!board.resolve_selector(GridCoord::new(0, 0), Side::Bottom, Side::Left));
        assert!(!board.resolve_selector(GridCoord::new(3, 3), Side::Top, Side::Left));
        assert!(!board.resolve_selector(GridCoord::new(3, 3), Side::Bottom, Side::Bottom));
        assert_eq!(board.open_selectors().len(), 1);
    }

    #[test]
    fn placement_is_once_per_turn_and_reaches_ready() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        board.spawn(1, GridCoord::new(1, 1), None, Side::Bottom);
        board.hand = Some(
            Cell::from_shapes(&[
                SegmentShape::ArcLT,
                SegmentShape::ArcTR,
                SegmentShape::ArcRB,
                SegmentShape::ArcBL,
            ])
            .expect("arcs cover all sides"),
        );
        board.plan();
        assert_eq!(board.phase(), TurnPhase::Planning);

        assert!(board.place_cell(GridCoord::new(5, 5)));
        assert_eq!(board.phase(), TurnPhase::Ready);
        let placed = board.cell(GridCoord::new(5, 5)).expect("in bounds");
        assert_eq!(placed.segments[0].shape, SegmentShape::ArcLT);
        assert_eq!(placed.coord, GridCoord::new(5, 5));
        assert!(board.cell_in_hand().is_none());

        assert!(!board.place_cell(GridCoord::new(1, 2)));
        assert!(!board.place_cell(GridCoord::new(99, 0)));
    }

    #[test]
    fn ball_under_replaced_cell_reresolves_direction() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        let id = board.spawn(1, GridCoord::new(2, 2), Some(0), Side::Bottom);
        board.hand = Some(Cell::from_shapes(&FORK).expect("fork covers all sides"));
        board.plan();

        assert!(board.place_cell(GridCoord::new(2, 2)));
        assert_eq!(board.ball(id).map(|b| b.segment), Some(None));
        // The new cell forks at the ball's entry side.
        assert_eq!(board.phase(), TurnPhase::AwaitingSelectors);
        assert_eq!(board.open_selectors()[0].coord, GridCoord::new(2, 2));
    }

    #[test]
    fn advance_moves_ball_across_the_wrapped_edge() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        let id = board.spawn(1, GridCoord::new(3, 6), None, Side::Bottom);
        board.plan();
        assert!(board.place_cell(GridCoord::new(0, 0)));

        let report = board.advance_turn().expect("ready");
        assert!(report.destroyed.is_empty());
        let ball = board.ball(id).expect("alive");
        assert_eq!(ball.coord, GridCoord::new(3, 0));
        assert_eq!(ball.from_side, Side::Bottom);
        assert_eq!(ball.progress, 0.0);
        assert_eq!(board.score().moves(), 1);
    }

    #[test]
    fn hazard_line_sweeps_crossing_ball() {
        let config = GameConfig {
            field_size: 9,
            extra_moves: 0,
            ..GameConfig::default()
        };
        let mut board = Board::uniform(config, &CROSS);
        // Riding up from row 1 while the line moves 1.1 -> 1.85: the two
        // cross and the ball dies.
        board.spawn(1, GridCoord::new(4, 1), None, Side::Bottom);
        board.plan();
        assert!(board.place_cell(GridCoord::new(0, 0)));

        let report = board.advance_turn().expect("ready");
        assert_eq!(report.destroyed, vec![1]);
        assert_eq!(board.live_balls(), 0);
    }

    #[test]
    fn reincarnation_picks_segment_farthest_from_hazard() {
        let config = GameConfig {
            reincarnation: true,
            extra_moves: 0,
            ..GameConfig::default()
        };
        let mut board = Board::uniform(config, &CROSS);
        board.spawn(1, GridCoord::new(1, 1), None, Side::Bottom);
        assert_eq!(board.kill_balls_matching(|b| b.color == 1), vec![1]);
        assert!(board.place_cell(GridCoord::new(0, 0)));

        let report = board.advance_turn().expect("ready");
        assert_eq!(report.reborn, vec![1]);
        assert_eq!(board.live_balls(), 1);
        // Line sits at 1.85 after the move; row 5 midpoints are the
        // farthest wraparound distance, lowest column breaks the tie.
        let (_, ball) = board.balls().next().expect("one ball");
        assert_eq!(ball.coord, GridCoord::new(0, 5));
        assert!(ball.segment.is_some());
    }

    #[test]
    fn set_progress_outside_advance_is_ignored() {
        let mut board = Board::uniform(quiet_config(), &CROSS);
        let id = board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        board.plan();
        board.set_progress(0.7);
        assert_eq!(board.ball(id).map(|b| b.progress), Some(0.0));
    }

    #[test]
    fn advance_refused_until_ready() {
        let mut board = Board::uniform(quiet_config(), &FORK);
        board.spawn(1, GridCoord::new(3, 3), None, Side::Bottom);
        board.plan();
        // Selector still open: not ready even after placing.
        assert!(board.place_cell(GridCoord::new(0, 0)));
        assert_eq!(board.phase(), TurnPhase::AwaitingSelectors);
        assert!(board.advance_turn().is_none());

        assert!(board.resolve_selector(GridCoord::new(3, 3), Side::Bottom, Side::Top));
        assert_eq!(board.phase(), TurnPhase::Ready);
        assert!(board.advance_turn().is_some());
    }

    #[test]
    fn suggest_placement_stays_in_bounds() {
        let mut board = Board::new_game(GameConfig::default(), 5);
        for _ in 0..20 {
            assert!(board.suggest_placement().in_bounds(board.size()));
        }
    }

    #[test]
    fn snapshot_restore_preserves_plan_and_selectors() {
        let mut board = Board::new_game(GameConfig::default(), 42);
        // Resolve the earliest junction if one is open, so a player
        // choice is part of the snapshot.
        if let Some(sel) = board.open_selectors().first().cloned() {
            let dir = sel.directions[0];
            assert!(board.resolve_selector(sel.coord, sel.side, dir));
        }

        let state = board.snapshot();
        let bytes = state.encode().expect("encode");
        let decoded = SaveState::decode(&bytes).expect("decode");
        let restored = Board::restore(&decoded, 7).expect("restore");

        assert_eq!(restored.phase(), board.phase());
        assert_eq!(restored.open_selectors(), board.open_selectors());
        assert_eq!(restored.hazard().y(), board.hazard().y());
        for (a, b) in restored.cells.iter().zip(board.cells.iter()) {
            assert_eq!(a, b);
        }
        let mut ours: Vec<Ball> = board.balls.values().cloned().collect();
        let mut theirs: Vec<Ball> = restored.balls.values().cloned().collect();
        ours.sort_by_key(|b| b.color);
        theirs.sort_by_key(|b| b.color);
        assert_eq!(ours, theirs);
    }

    #[test]
    fn new_game_seeds_balls_on_odd_columns() {
        let board = Board::new_game(GameConfig::default(), 9);
        assert_eq!(board.live_balls(), 3);
        let mut colors: Vec<u8> = board.balls().map(|(_, b)| b.color).collect();
        colors.sort_unstable();
        assert_eq!(colors, vec![1, 2, 3]);
        for (_, ball) in board.balls() {
            assert_eq!(ball.coord.y, 2);
            assert_eq!(ball.coord.x % 2, 1);
            assert_eq!(ball.from_side, Side::Bottom);
        }
    }
}
