/*!

This is the long-form manual for `ballot_engine` and `decadevote`.

## Ballots

A ballot ranks exactly 20 distinct movies released during one decade. The movie
at rank `r` receives `21 - r` points: 20 points for the first place, 1 point for
the twentieth. A complete ballot is therefore always worth 210 points.

Each slot holds a movie reference:
* a movie from the catalog, identified by its catalog id;
* an unlisted movie, that the voter could not find in the catalog. It carries
  the year and the director typed by the voter. Its id is written `none`.

Two slots may not hold the same movie: same catalog id, or same title once
trimmed and lowercased.

## Lists

A list collects the ballots of one round of voting for one decade. It is
identified as `<decade>-<index>`, for example `1990-0` for the first list of the
nineties. At most one list is open for voting at any time. A closed list never
reopens: the next round of the same decade gets a new list with the next index.

## Leaderboards

Every accepted ballot is merged into the leaderboard of its list:
* a movie already on the leaderboard gains the points of its slot, and the voter
  is added to the attributions of the place at which they ranked it;
* a movie not yet on the leaderboard is added with the points of its slot.

The leaderboard is ordered by decreasing points. Between movies with the same
points, the movies added by the latest ballot come first, in the order of the
ballot, followed by the movies that were already there, in their previous
order.

## The `decadevote` program

`decadevote --config session.json` runs a complete voting round from files:
creates a list, reads the ballots, submits them one after the other, and prints
the leaderboard in JSON.

Options:
* `--out <path>` writes the JSON summary to a file instead of the standard output
* `--csv <path>` also writes the leaderboard in CSV (`tmdbID,Title,Points`)
* `--reference <path>` compares the summary with a reference summary, and fails
  showing the differences if they do not match
* `--close` closes the list at the end, whatever the session file says
* `--verbose` turns on debug logging

### Session file

```json
{
  "outputSettings": {
    "listName": "Best of the nineties",
    "decade": 1990,
    "outputDirectory": "out",
    "closeList": true
  },
  "catalog": [
    { "id": 949, "title": "Heat", "year": 1995, "director": "Michael Mann" }
  ],
  "ballotSources": [
    { "provider": "csv", "filePath": "ballots.csv", "hasHeader": true }
  ],
  "rules": {
    "maxMergeAttempts": 5,
    "earliestDecade": 1890,
    "latestDecade": 2020
  }
}
```

The paths of the sources are relative to the session file. The `rules`
section is optional and every field of it too.

### `csv`

One ballot per row: the voter id, the voter name, then the 20 movies in order.

```text
voterId,voterName,choice 1,choice 2,...,choice 20
ana,Ana,Heat,Lost reel|1994|Someone,...
```

A cell holding only a title must match a catalog movie of the decade: either a
movie with exactly that title (ignoring case), or the only candidate found for
it. A movie absent from the catalog is written `title|year|director`.

### `json`

A list of ballots:

```json
[
  {
    "voterId": "ana",
    "voterName": "Ana",
    "movies": [
      { "title": "Heat" },
      { "title": "Lost reel", "year": "1994", "director": "Someone" }
    ]
  }
]
```

### Summary

The summary holds the settings of the session and the final leaderboard, with
the director of every movie looked up for display:

```json
{
  "config": { "list": "1990-0", "name": "Best of the nineties", "decade": 1990, "status": "closed", "ballots": 2 },
  "results": [
    { "place": 1, "externalId": 949, "title": "Heat", "director": "Michael Mann", "points": 39,
      "voters": [ { "place": "#1", "name": ["Ana"] }, { "place": "#2", "name": ["Bia"] } ] }
  ]
}
```

 */
