mod fakes;
mod maintenance;
mod search;
